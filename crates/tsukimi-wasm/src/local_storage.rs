use tsukimi_core::error::TsukimiError;
use tsukimi_core::kv::KvStore;

/// `window.localStorage` as a [`KvStore`].
///
/// Holds no JS handles itself, so it stays `Send + Sync`; the storage object
/// is looked up on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageKv;

impl LocalStorageKv {
    fn storage() -> Result<web_sys::Storage, TsukimiError> {
        let window =
            web_sys::window().ok_or_else(|| TsukimiError::Storage("no window".into()))?;
        window
            .local_storage()
            .map_err(|e| TsukimiError::Storage(format!("{e:?}")))?
            .ok_or_else(|| TsukimiError::Storage("localStorage unavailable".into()))
    }
}

impl KvStore for LocalStorageKv {
    fn read(&self, name: &str) -> Result<Option<String>, TsukimiError> {
        Self::storage()?
            .get_item(name)
            .map_err(|e| TsukimiError::Storage(format!("{e:?}")))
    }

    fn write(&self, name: &str, value: &str) -> Result<(), TsukimiError> {
        // Quota errors surface here; the store then falls back to memory.
        Self::storage()?
            .set_item(name, value)
            .map_err(|e| TsukimiError::Storage(format!("{e:?}")))
    }

    fn remove(&self, name: &str) -> Result<(), TsukimiError> {
        Self::storage()?
            .remove_item(name)
            .map_err(|e| TsukimiError::Storage(format!("{e:?}")))
    }
}
