use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::error::TsukimiError;
use crate::kv::KvStore;
use crate::listeners::{Listener, ListenerSet, Subscription};
use crate::models::{ProgressChange, ProgressEntry, TitleRef};

/// Title-id string to entry, the shape of the persisted record.
pub type ProgressMap = BTreeMap<String, ProgressEntry>;

/// Title-id string to the time it was removed locally.
pub type Tombstones = BTreeMap<String, DateTime<Utc>>;

/// Default window in which re-recording the same episode is ignored.
pub const DEFAULT_REPEAT_SUPPRESS_SECS: i64 = 60;

/// Result of reconciling local entries with a remote snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Keys whose remote copy replaced (or created) the local one.
    pub pulled: Vec<String>,
    /// Local entries that are newer than, or missing from, the remote snapshot.
    pub local_newer: Vec<ProgressEntry>,
    /// Keys removed locally that the remote copy must delete too.
    pub deleted: Vec<String>,
}

/// Everything the store holds once durable writes have failed.
#[derive(Debug, Clone, Default)]
struct Memory {
    entries: ProgressMap,
    tombstones: Tombstones,
}

/// Durable per-title watch progress.
///
/// The whole map lives in a single JSON record and is re-read on every call,
/// so other writers (another tab, another process) are always observed.
/// Every mutation goes through one locked write path which persists the full
/// map and then notifies subscribers.
///
/// Storage failures never escape: unreadable records read as empty, and a
/// failed write switches the store to an in-memory map for the rest of the
/// session.
pub struct ProgressStore<S> {
    kv: S,
    record_name: String,
    suppress_window: Duration,
    listeners: ListenerSet<ProgressChange>,
    write_lock: Mutex<()>,
    ephemeral: Mutex<Option<Memory>>,
}

impl<S: KvStore> ProgressStore<S> {
    pub fn new(kv: S, record_name: impl Into<String>) -> Self {
        Self {
            kv,
            record_name: record_name.into(),
            suppress_window: Duration::seconds(DEFAULT_REPEAT_SUPPRESS_SECS),
            listeners: ListenerSet::new(),
            write_lock: Mutex::new(()),
            ephemeral: Mutex::new(None),
        }
    }

    pub fn with_suppress_window(mut self, window: Duration) -> Self {
        self.suppress_window = window;
        self
    }

    // ── Reads ───────────────────────────────────────────────────

    pub fn get_all(&self) -> ProgressMap {
        self.load()
    }

    pub fn get(&self, title_id: u64) -> Option<ProgressEntry> {
        self.load().remove(&title_id.to_string())
    }

    /// Entries ordered by most recent access; legacy entries without a
    /// timestamp come last.
    pub fn continue_watching(&self, limit: usize) -> Vec<ProgressEntry> {
        let mut entries: Vec<ProgressEntry> = self.load().into_values().collect();
        entries.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        entries.truncate(limit);
        entries
    }

    /// Whether a write failure has switched the store to memory-only mode.
    pub fn is_degraded(&self) -> bool {
        lock(&self.ephemeral).is_some()
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Record `episode` as the last watched episode of `title`.
    ///
    /// Returns the written entry, or `None` when the write was suppressed
    /// because the same episode was recorded within the suppression window.
    pub fn record_episode(&self, title: &TitleRef, episode: u32) -> Option<ProgressEntry> {
        self.record_episode_at(title, episode, Utc::now())
    }

    pub fn record_episode_at(
        &self,
        title: &TitleRef,
        episode: u32,
        now: DateTime<Utc>,
    ) -> Option<ProgressEntry> {
        let guard = lock(&self.write_lock);
        let mut map = self.load();
        let key = title.key();

        let entry = match map.get_mut(&key) {
            Some(existing) => {
                // A timestamp from the future (clock skew) never counts as recent.
                let recent = existing.last_accessed.is_some_and(|at| {
                    let age = now.signed_duration_since(at);
                    age >= Duration::zero() && age < self.suppress_window
                });
                if existing.last_episode_watched == episode && recent {
                    tracing::trace!(key = %key, episode, "Repeated episode write suppressed");
                    return None;
                }
                existing.refresh_display(title);
                existing.last_episode_watched = episode;
                existing.last_accessed = Some(now);
                existing.clone()
            }
            None => {
                let entry = ProgressEntry::new(title, episode, now);
                map.insert(key.clone(), entry.clone());
                entry
            }
        };

        self.persist(&map);
        self.lift_tombstone(&key);
        drop(guard);
        tracing::debug!(key = %key, episode, "Recorded episode");
        self.listeners.emit(&ProgressChange::Upserted(entry.clone()));
        Some(entry)
    }

    /// Mark `title` as accessed, creating it at episode 1 if unknown.
    pub fn record_access(&self, title: &TitleRef) -> ProgressEntry {
        self.record_access_at(title, Utc::now())
    }

    pub fn record_access_at(&self, title: &TitleRef, now: DateTime<Utc>) -> ProgressEntry {
        let guard = lock(&self.write_lock);
        let mut map = self.load();
        let key = title.key();
        let entry = map
            .entry(key.clone())
            .and_modify(|existing| {
                existing.refresh_display(title);
                existing.last_accessed = Some(now);
            })
            .or_insert_with(|| ProgressEntry::new(title, 1, now))
            .clone();

        self.persist(&map);
        self.lift_tombstone(&key);
        drop(guard);
        self.listeners.emit(&ProgressChange::Upserted(entry.clone()));
        entry
    }

    /// Delete the entry for `title_id`. Returns whether one existed.
    ///
    /// A tombstone is kept so a later [`merge_remote`](Self::merge_remote)
    /// does not bring the entry back.
    pub fn remove(&self, title_id: u64) -> bool {
        self.remove_at(title_id, Utc::now())
    }

    pub fn remove_at(&self, title_id: u64, now: DateTime<Utc>) -> bool {
        let guard = lock(&self.write_lock);
        let mut map = self.load();
        let key = title_id.to_string();
        if map.remove(&key).is_none() {
            return false;
        }

        self.persist(&map);
        let mut tombstones = self.load_tombstones();
        tombstones.insert(key.clone(), now);
        self.persist_tombstones(&tombstones);
        drop(guard);
        tracing::debug!(key = %key, "Removed progress entry");
        self.listeners.emit(&ProgressChange::Removed(key));
        true
    }

    /// Fold a remote snapshot into the local map.
    ///
    /// A remote entry wins only when it was accessed strictly later than the
    /// local one (or the local one is missing). Ties keep the local entry.
    pub fn merge_remote(&self, remote: ProgressMap) -> MergeOutcome {
        let guard = lock(&self.write_lock);
        let mut map = self.load();
        let mut tombstones = self.load_tombstones();
        let mut outcome = MergeOutcome::default();

        for (key, local) in &map {
            match remote.get(key) {
                Some(theirs) if local.last_accessed > theirs.last_accessed => {
                    outcome.local_newer.push(local.clone());
                }
                None => outcome.local_newer.push(local.clone()),
                Some(_) => {}
            }
        }

        let mut revived = false;
        for (key, theirs) in remote {
            if let Some(removed_at) = tombstones.get(&key) {
                // Watched again elsewhere after the local removal.
                if theirs.last_accessed.is_some_and(|at| at > *removed_at) {
                    tombstones.remove(&key);
                    revived = true;
                } else {
                    continue;
                }
            }
            let take = match map.get(&key) {
                Some(local) => theirs.last_accessed > local.last_accessed,
                None => true,
            };
            if take {
                outcome.pulled.push(key.clone());
                map.insert(key, theirs);
            }
        }
        outcome.deleted = tombstones.keys().cloned().collect();

        if revived {
            self.persist_tombstones(&tombstones);
        }
        if !outcome.pulled.is_empty() {
            self.persist(&map);
            drop(guard);
            tracing::info!(
                pulled = outcome.pulled.len(),
                pushed = outcome.local_newer.len(),
                deleted = outcome.deleted.len(),
                "Merged remote progress"
            );
            self.listeners
                .emit(&ProgressChange::Replaced(outcome.pulled.clone()));
        }
        outcome
    }

    /// Removals not yet known to be mirrored remotely.
    pub fn tombstones(&self) -> Tombstones {
        self.load_tombstones()
    }

    /// Forget tombstones whose deletes have been handed to the sync queue.
    pub fn clear_tombstones(&self, keys: &[String]) {
        let _guard = lock(&self.write_lock);
        let mut tombstones = self.load_tombstones();
        let before = tombstones.len();
        for key in keys {
            tombstones.remove(key);
        }
        if tombstones.len() != before {
            self.persist_tombstones(&tombstones);
        }
    }

    /// Listen for local changes. Dropping the subscription unregisters.
    pub fn subscribe(&self, listener: Listener<ProgressChange>) -> Subscription<ProgressChange> {
        self.listeners.subscribe(listener)
    }

    // ── Persistence ─────────────────────────────────────────────

    fn tombstone_record(&self) -> String {
        format!("{}-tombstones", self.record_name)
    }

    fn load(&self) -> ProgressMap {
        if let Some(memory) = lock(&self.ephemeral).as_ref() {
            return memory.entries.clone();
        }
        self.read_entries()
    }

    fn load_tombstones(&self) -> Tombstones {
        if let Some(memory) = lock(&self.ephemeral).as_ref() {
            return memory.tombstones.clone();
        }
        self.read_tombstones()
    }

    fn read_entries(&self) -> ProgressMap {
        match self.kv.read(&self.record_name) {
            Ok(Some(raw)) => parse_record(&raw),
            Ok(None) => ProgressMap::new(),
            Err(e) => {
                tracing::warn!(record = %self.record_name, "Failed to read progress: {e}");
                ProgressMap::new()
            }
        }
    }

    fn read_tombstones(&self) -> Tombstones {
        let record = self.tombstone_record();
        match self.kv.read(&record) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(record = %record, "Tombstone record is malformed, ignoring: {e}");
                Tombstones::new()
            }),
            Ok(None) => Tombstones::new(),
            Err(e) => {
                tracing::warn!(record = %record, "Failed to read tombstones: {e}");
                Tombstones::new()
            }
        }
    }

    fn persist(&self, map: &ProgressMap) {
        let name = self.record_name.clone();
        self.write_record(&name, map, |memory| memory.entries = map.clone());
    }

    fn persist_tombstones(&self, tombstones: &Tombstones) {
        let name = self.tombstone_record();
        self.write_record(&name, tombstones, |memory| {
            memory.tombstones = tombstones.clone();
        });
    }

    /// Drop the tombstone for `key` after it was written again.
    fn lift_tombstone(&self, key: &str) {
        let mut tombstones = self.load_tombstones();
        if tombstones.remove(key).is_some() {
            self.persist_tombstones(&tombstones);
        }
    }

    fn write_record<T: serde::Serialize>(
        &self,
        name: &str,
        value: &T,
        apply: impl FnOnce(&mut Memory),
    ) {
        let mut ephemeral = lock(&self.ephemeral);
        if let Some(memory) = ephemeral.as_mut() {
            apply(memory);
            return;
        }

        let result = serde_json::to_string(value)
            .map_err(TsukimiError::from)
            .and_then(|json| self.kv.write(name, &json));
        if let Err(e) = result {
            tracing::warn!(
                record = %name,
                "Failed to persist progress, keeping it in memory for this session: {e}"
            );
            let mut memory = Memory {
                entries: self.read_entries(),
                tombstones: self.read_tombstones(),
            };
            apply(&mut memory);
            *ephemeral = Some(memory);
        }
    }
}

/// Parse the persisted record, dropping anything that is not a valid entry.
fn parse_record(raw: &str) -> ProgressMap {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Progress record is not valid JSON, treating as empty: {e}");
            return ProgressMap::new();
        }
    };
    progress_map_from_value(value)
}

/// Keep the well-formed entries of a JSON object keyed by title id.
/// Anything other than an object yields an empty map.
pub fn progress_map_from_value(value: serde_json::Value) -> ProgressMap {
    let serde_json::Value::Object(object) = value else {
        tracing::warn!("Progress record is not an object, treating as empty");
        return ProgressMap::new();
    };

    object
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                tracing::debug!(key = %key, "Skipping malformed progress entry: {e}");
                None
            }
        })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
