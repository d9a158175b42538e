use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tsukimi_core::models::{PendingSyncBatch, ProgressEntry};

/// Request body for a batched progress write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub upserts: BTreeMap<String, ProgressEntry>,
    pub deletes: Vec<String>,
}

impl From<&PendingSyncBatch> for SyncPayload {
    fn from(batch: &PendingSyncBatch) -> Self {
        Self {
            upserts: batch
                .upserts()
                .map(|(key, entry)| (key.clone(), entry.clone()))
                .collect(),
            deletes: batch.deletes().cloned().collect(),
        }
    }
}
