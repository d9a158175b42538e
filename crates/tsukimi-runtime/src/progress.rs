use tsukimi_core::kv::KvStore;
use tsukimi_core::models::{ProgressEntry, SyncOp, TitleRef};
use tsukimi_core::storage::ProgressStore;

use crate::sync::SyncHandle;

/// The single write path for progress: every local mutation that changed
/// something is mirrored into the sync batch.
pub struct ProgressTracker<K> {
    store: ProgressStore<K>,
    sync: Option<SyncHandle>,
}

impl<K: KvStore> ProgressTracker<K> {
    pub fn new(store: ProgressStore<K>, sync: Option<SyncHandle>) -> Self {
        Self { store, sync }
    }

    pub fn store(&self) -> &ProgressStore<K> {
        &self.store
    }

    pub fn sync(&self) -> Option<&SyncHandle> {
        self.sync.as_ref()
    }

    pub fn record_episode(&self, title: &TitleRef, episode: u32) -> Option<ProgressEntry> {
        let entry = self.store.record_episode(title, episode)?;
        self.push(&entry);
        Some(entry)
    }

    pub fn record_access(&self, title: &TitleRef) -> ProgressEntry {
        let entry = self.store.record_access(title);
        self.push(&entry);
        entry
    }

    /// Remove locally and send a tombstone, whether or not the entry existed
    /// here; another device may still hold it.
    pub fn remove(&self, title_id: u64) -> bool {
        let removed = self.store.remove(title_id);
        if let Some(sync) = &self.sync {
            sync.enqueue(title_id.to_string(), SyncOp::Delete);
        }
        removed
    }

    /// Queue a delete for each key and drop its tombstone. Returns how many
    /// were queued; nothing happens without a sync scheduler.
    pub(crate) fn push_tombstones(&self, keys: &[String]) -> usize {
        let Some(sync) = &self.sync else {
            return 0;
        };
        for key in keys {
            sync.enqueue(key.clone(), SyncOp::Delete);
        }
        self.store.clear_tombstones(keys);
        keys.len()
    }

    pub(crate) fn push(&self, entry: &ProgressEntry) {
        if let Some(sync) = &self.sync {
            sync.enqueue(entry.key(), SyncOp::Upsert(entry.clone()));
        }
    }
}
