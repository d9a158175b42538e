//! Named durable records, the persistence primitive behind the progress store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::TsukimiError;

/// A string-valued key-value store holding whole records (browser
/// `localStorage` semantics).
pub trait KvStore: Send + Sync {
    fn read(&self, name: &str) -> Result<Option<String>, TsukimiError>;
    fn write(&self, name: &str, value: &str) -> Result<(), TsukimiError>;
    fn remove(&self, name: &str) -> Result<(), TsukimiError>;
}

impl<S: KvStore + ?Sized> KvStore for std::sync::Arc<S> {
    fn read(&self, name: &str) -> Result<Option<String>, TsukimiError> {
        (**self).read(name)
    }

    fn write(&self, name: &str, value: &str) -> Result<(), TsukimiError> {
        (**self).write(name, value)
    }

    fn remove(&self, name: &str) -> Result<(), TsukimiError> {
        (**self).remove(name)
    }
}

/// One `<name>.json` file per record inside a directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_name(name)))
    }
}

impl KvStore for FileKvStore {
    fn read(&self, name: &str) -> Result<Option<String>, TsukimiError> {
        match std::fs::read_to_string(self.record_path(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<(), TsukimiError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.record_path(name);
        // Write-then-rename so a crash never leaves a half-written record.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), TsukimiError> {
        match std::fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn read(&self, name: &str) -> Result<Option<String>, TsukimiError> {
        let records = self
            .records
            .lock()
            .map_err(|e| TsukimiError::Storage(e.to_string()))?;
        Ok(records.get(name).cloned())
    }

    fn write(&self, name: &str, value: &str) -> Result<(), TsukimiError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| TsukimiError::Storage(e.to_string()))?;
        records.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), TsukimiError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| TsukimiError::Storage(e.to_string()))?;
        records.remove(name);
        Ok(())
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        String::from("record")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("nested"));
        assert_eq!(store.read("progress").unwrap(), None);

        store.write("progress", "{\"1\":{}}").unwrap();
        assert_eq!(store.read("progress").unwrap().as_deref(), Some("{\"1\":{}}"));
        assert!(dir.path().join("nested/progress.json").exists());

        store.remove("progress").unwrap();
        assert_eq!(store.read("progress").unwrap(), None);
        // Removing twice is fine.
        store.remove("progress").unwrap();
    }

    #[test]
    fn test_record_names_cannot_escape_dir() {
        let store = FileKvStore::new("/tmp/tsukimi");
        assert_eq!(
            store.record_path("../etc/passwd"),
            PathBuf::from("/tmp/tsukimi/___etc_passwd.json")
        );
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryKvStore::new();
        store.write("a", "1").unwrap();
        assert_eq!(store.read("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.read("a").unwrap(), None);
    }
}
