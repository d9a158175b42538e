//! Trait definitions for the remote services the runtime talks to.
//!
//! The runtime is generic over these so tests can substitute in-memory fakes
//! for the HTTP clients.

use std::future::Future;

use tsukimi_core::models::{EpisodeMapping, Identity, PendingSyncBatch};
use tsukimi_core::storage::ProgressMap;

use crate::mapping::types::TitleMapping;

/// Authenticated remote copy of the progress map.
pub trait RemoteProgressStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Apply a batch of upserts and tombstones. Sent once; never retried.
    fn push(
        &self,
        identity: &Identity,
        batch: &PendingSyncBatch,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Fetch the user's whole remote map.
    fn fetch(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<ProgressMap, Self::Error>> + Send;
}

/// Auxiliary per-title metadata used to enrich resolution and display.
pub trait MappingService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Episode titles, filler flags and alternate catalog ids.
    fn title_mapping(
        &self,
        anilist_id: u64,
    ) -> impl Future<Output = Result<TitleMapping, Self::Error>> + Send;

    /// Episode number to provider episode id, for mapping-backed sources.
    fn episode_mapping(
        &self,
        anilist_id: u64,
    ) -> impl Future<Output = Result<EpisodeMapping, Self::Error>> + Send;
}
