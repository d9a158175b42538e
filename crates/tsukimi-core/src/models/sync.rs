use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ProgressEntry;

/// Authenticated session used as the remote sync destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub token: String,
}

/// A pending remote write for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOp {
    Upsert(ProgressEntry),
    /// Tombstone: the remote store must delete the key.
    Delete,
}

/// Changes accumulated between flushes. Later writes to a key replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSyncBatch {
    ops: BTreeMap<String, SyncOp>,
}

impl PendingSyncBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, op: SyncOp) {
        self.ops.insert(key.into(), op);
    }

    pub fn get(&self, key: &str) -> Option<&SyncOp> {
        self.ops.get(key)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Move the whole batch out, leaving this one empty.
    pub fn take(&mut self) -> PendingSyncBatch {
        std::mem::take(self)
    }

    pub fn upserts(&self) -> impl Iterator<Item = (&String, &ProgressEntry)> {
        self.ops.iter().filter_map(|(key, op)| match op {
            SyncOp::Upsert(entry) => Some((key, entry)),
            SyncOp::Delete => None,
        })
    }

    pub fn deletes(&self) -> impl Iterator<Item = &String> {
        self.ops
            .iter()
            .filter_map(|(key, op)| matches!(op, SyncOp::Delete).then_some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TitleRef;
    use chrono::Utc;

    #[test]
    fn test_last_write_wins_per_key() {
        let title = TitleRef::series(5, "Mushishi");
        let mut batch = PendingSyncBatch::new();
        batch.insert("5", SyncOp::Upsert(ProgressEntry::new(&title, 1, Utc::now())));
        batch.insert("5", SyncOp::Upsert(ProgressEntry::new(&title, 4, Utc::now())));
        assert_eq!(batch.len(), 1);
        match batch.get("5") {
            Some(SyncOp::Upsert(entry)) => assert_eq!(entry.last_episode_watched, 4),
            other => panic!("Expected upsert, got {other:?}"),
        }

        batch.insert("5", SyncOp::Delete);
        assert_eq!(batch.get("5"), Some(&SyncOp::Delete));
        assert_eq!(batch.deletes().count(), 1);
        assert_eq!(batch.upserts().count(), 0);
    }

    #[test]
    fn test_take_clears() {
        let mut batch = PendingSyncBatch::new();
        batch.insert("9", SyncOp::Delete);
        let taken = batch.take();
        assert!(batch.is_empty());
        assert_eq!(taken.len(), 1);
    }
}
