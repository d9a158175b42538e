mod overlay;
mod progress;
mod session;
mod sync;

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tsukimi_api::mapping::types::TitleMapping;
use tsukimi_api::traits::{MappingService, RemoteProgressStore};
use tsukimi_bridge::{AllowList, MessagePort, PlayerEvent, PlayerEventKind};
use tsukimi_core::catalog::{GatedSelection, Resolver, SourceCatalog};
use tsukimi_core::config::AppConfig;
use tsukimi_core::episodes::{available_episode_count, episode_ranges};
use tsukimi_core::error::TsukimiError;
use tsukimi_core::kv::KvStore;
use tsukimi_core::listeners::Listener;
use tsukimi_core::models::{
    EpisodeMeta, Identity, Language, MappingState, MediaInfo, ProgressEntry, TitleRef,
};
use tsukimi_core::overlay::OverlayTimings;
use tsukimi_core::resolve::{resolve, StreamCriteria, StreamResolution};
use tsukimi_core::selection::SelectionTracker;
use tsukimi_core::storage::{MergeOutcome, ProgressStore, DEFAULT_REPEAT_SUPPRESS_SECS};

pub use overlay::{OverlayDriver, ScopedTimer};
pub use progress::ProgressTracker;
pub use session::{Mount, PlayerSession};
pub use sync::{SchedulerState, SyncEvent, SyncHandle};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] TsukimiError),
    #[error("sync error: {0}")]
    Sync(String),
    #[error("config error: {0}")]
    Config(String),
}

/// What the UI asks to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub title_id: u64,
    /// Secondary catalog id, if the caller already knows it.
    pub external_id: Option<u64>,
    pub episode: u32,
    pub source_id: String,
    pub language: Language,
}

#[derive(Default)]
struct MetadataCache {
    episode_maps: HashMap<u64, MappingState>,
    titles: HashMap<u64, TitleMapping>,
}

/// Wires the progress store, sync scheduler, mapping service and source
/// catalog together. Must be created inside a tokio runtime.
pub struct Runtime<K, R, M> {
    config: AppConfig,
    catalog: SourceCatalog,
    progress: Arc<ProgressTracker<K>>,
    remote: Option<Arc<R>>,
    mapping: M,
    identity: Mutex<Option<Identity>>,
    selection: Arc<SelectionTracker>,
    metadata: Mutex<MetadataCache>,
}

impl<K, R, M> Runtime<K, R, M>
where
    K: KvStore + 'static,
    R: RemoteProgressStore + 'static,
    M: MappingService,
{
    pub fn new(
        config: AppConfig,
        catalog: SourceCatalog,
        kv: K,
        remote: Option<Arc<R>>,
        mapping: M,
    ) -> Self {
        let suppress = i64::try_from(config.progress.repeat_suppress_secs)
            .unwrap_or(DEFAULT_REPEAT_SUPPRESS_SECS);
        let store = ProgressStore::new(kv, config.storage.record_name.clone())
            .with_suppress_window(chrono::Duration::seconds(suppress));

        let sync = match &remote {
            Some(remote) if config.sync.enabled => Some(SyncHandle::spawn(
                Arc::clone(remote),
                config.sync.debounce(),
            )),
            _ => None,
        };

        Self {
            config,
            catalog,
            progress: Arc::new(ProgressTracker::new(store, sync)),
            remote,
            mapping,
            identity: Mutex::new(None),
            selection: Arc::new(SelectionTracker::new()),
            metadata: Mutex::new(MetadataCache::default()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &ProgressStore<K> {
        self.progress.store()
    }

    pub fn sync_events(&self) -> Option<tokio::sync::broadcast::Receiver<SyncEvent>> {
        self.progress.sync().map(SyncHandle::subscribe)
    }

    // ── Progress ────────────────────────────────────────────────

    pub fn record_episode(&self, title: &TitleRef, episode: u32) -> Option<ProgressEntry> {
        self.progress.record_episode(title, episode)
    }

    pub fn record_access(&self, title: &TitleRef) -> ProgressEntry {
        self.progress.record_access(title)
    }

    /// Signed out, the tombstone is kept and its delete is sent on the next
    /// sign-in instead.
    pub fn remove(&self, title_id: u64) -> bool {
        let removed = self.progress.remove(title_id);
        if removed && self.progress.sync().is_some() && self.identity().is_some() {
            self.progress
                .store()
                .clear_tombstones(&[title_id.to_string()]);
        }
        removed
    }

    pub fn continue_watching(&self, limit: usize) -> Vec<ProgressEntry> {
        self.progress.store().continue_watching(limit)
    }

    // ── Identity ────────────────────────────────────────────────

    pub fn identity(&self) -> Option<Identity> {
        lock(&self.identity).clone()
    }

    /// Attach an identity and reconcile local progress with the remote copy.
    ///
    /// Newer remote entries are pulled into the local store; local entries
    /// that are newer (or unknown remotely) are queued for the next flush,
    /// together with deletes for titles removed while signed out.
    pub async fn sign_in(&self, identity: Identity) -> Result<MergeOutcome, RuntimeError> {
        *lock(&self.identity) = Some(identity.clone());
        let Some(remote) = &self.remote else {
            return Ok(MergeOutcome::default());
        };
        if let Some(sync) = self.progress.sync() {
            sync.set_identity(Some(identity.clone()));
        }

        let remote_map = remote
            .fetch(&identity)
            .await
            .map_err(|e| RuntimeError::Sync(e.to_string()))?;
        let outcome = self.progress.store().merge_remote(remote_map);
        for entry in &outcome.local_newer {
            self.progress.push(entry);
        }
        let deleted = self.progress.push_tombstones(&outcome.deleted);
        tracing::info!(
            user = %identity.user_id,
            pulled = outcome.pulled.len(),
            pushed = outcome.local_newer.len(),
            deleted,
            "Signed in"
        );
        Ok(outcome)
    }

    /// Detach the identity. Anything not yet flushed is discarded.
    pub fn sign_out(&self) {
        if lock(&self.identity).take().is_some() {
            tracing::info!("Signed out");
        }
        if let Some(sync) = self.progress.sync() {
            sync.set_identity(None);
        }
    }

    // ── Resolution ──────────────────────────────────────────────

    /// Gate and resolve using only metadata that is already loaded.
    pub fn resolve_cached(
        &self,
        request: &StreamRequest,
    ) -> Result<StreamResolution, RuntimeError> {
        let selection = self.catalog.gate(&request.source_id, request.language)?;
        let (external_id, mapping) = self.cached_metadata(request);
        Ok(resolve(&StreamCriteria {
            title_id: request.title_id,
            external_id,
            episode: request.episode,
            selection: &selection,
            mapping: &mapping,
        }))
    }

    /// Make `request` the active selection and resolve it, loading any
    /// metadata the source needs.
    ///
    /// Returns `Ok(None)` when another selection started before this one
    /// finished; the caller must not apply anything in that case. A gated-off
    /// (source, language) pair is an error and never reaches URL building.
    pub async fn resolve_stream(
        &self,
        request: &StreamRequest,
    ) -> Result<Option<StreamResolution>, RuntimeError> {
        let ticket = self.selection.begin();
        let selection = self.catalog.gate(&request.source_id, request.language)?;
        let resolution = self.resolve_loading(request, &selection).await;
        Ok(self.selection.apply(ticket, resolution))
    }

    async fn resolve_loading(
        &self,
        request: &StreamRequest,
        selection: &GatedSelection,
    ) -> StreamResolution {
        let (mut external_id, mut mapping) = self.cached_metadata(request);

        match &selection.source().resolver {
            Resolver::ExternalId { .. } if external_id.is_none() => {
                match self.title_mapping(request.title_id).await {
                    Ok(title) => match title.mal_id {
                        Some(id) => external_id = Some(id),
                        None => return StreamResolution::Unavailable,
                    },
                    Err(reason) => return StreamResolution::Failed(reason),
                }
            }
            Resolver::EpisodeMapping { .. } if mapping == MappingState::NotLoaded => {
                mapping = self.episode_mapping(request.title_id).await;
            }
            _ => {}
        }

        resolve(&StreamCriteria {
            title_id: request.title_id,
            external_id,
            episode: request.episode,
            selection,
            mapping: &mapping,
        })
    }

    fn cached_metadata(&self, request: &StreamRequest) -> (Option<u64>, MappingState) {
        let cache = lock(&self.metadata);
        let external_id = request.external_id.or_else(|| {
            cache
                .titles
                .get(&request.title_id)
                .and_then(|t| t.mal_id)
        });
        let mapping = cache
            .episode_maps
            .get(&request.title_id)
            .cloned()
            .unwrap_or_default();
        (external_id, mapping)
    }

    /// Fetch (or reuse) the provider episode table. Failures are reported but
    /// not cached so the next resolution tries again.
    async fn episode_mapping(&self, title_id: u64) -> MappingState {
        if let Some(state) = lock(&self.metadata).episode_maps.get(&title_id) {
            return state.clone();
        }
        match self.mapping.episode_mapping(title_id).await {
            Ok(mapping) => {
                let state = MappingState::Loaded(mapping);
                lock(&self.metadata)
                    .episode_maps
                    .insert(title_id, state.clone());
                state
            }
            Err(e) => {
                tracing::warn!(title_id, "Episode mapping fetch failed: {e}");
                MappingState::Failed(e.to_string())
            }
        }
    }

    async fn title_mapping(&self, title_id: u64) -> Result<TitleMapping, String> {
        if let Some(title) = lock(&self.metadata).titles.get(&title_id) {
            return Ok(title.clone());
        }
        match self.mapping.title_mapping(title_id).await {
            Ok(title) => {
                lock(&self.metadata)
                    .titles
                    .insert(title_id, title.clone());
                Ok(title)
            }
            Err(e) => {
                tracing::warn!(title_id, "Title mapping fetch failed: {e}");
                Err(e.to_string())
            }
        }
    }

    // ── Episodes ────────────────────────────────────────────────

    /// Navigation pages for the episode list.
    pub fn episode_pages(&self, media: &MediaInfo) -> Vec<RangeInclusive<u32>> {
        episode_ranges(
            available_episode_count(media),
            self.config.player.episodes_per_page,
        )
    }

    /// Aired episodes with titles and filler flags where the mapping service
    /// knows them. Metadata failures only cost the titles.
    pub async fn episodes(&self, media: &MediaInfo) -> Vec<EpisodeMeta> {
        let count = available_episode_count(media);
        let known: HashMap<u32, EpisodeMeta> = match self.title_mapping(media.id).await {
            Ok(title) => title
                .episodes
                .into_iter()
                .map(|meta| (meta.number, meta))
                .collect(),
            Err(_) => HashMap::new(),
        };
        (1..=count)
            .map(|number| {
                known.get(&number).cloned().unwrap_or(EpisodeMeta {
                    number,
                    title: None,
                    filler: false,
                })
            })
            .collect()
    }

    // ── Player ──────────────────────────────────────────────────

    /// Mount a player for the current selection.
    ///
    /// Trusted telemetry drives the overlay and records the episode once it
    /// starts playing, and again whenever the player reports a different one.
    /// Once another selection begins, the session stops recording.
    pub fn open_player(
        &self,
        port: &impl MessagePort,
        title: TitleRef,
        episode: u32,
        muted: bool,
    ) -> PlayerSession {
        let resuming = self
            .progress
            .store()
            .get(title.id)
            .is_some_and(|entry| entry.last_episode_watched > 0);
        let allow_list = AllowList::for_players(&self.catalog, &self.config.bridge);

        let ticket = self.selection.current();
        let hook: Listener<PlayerEvent> = {
            let progress = Arc::clone(&self.progress);
            let selection = Arc::clone(&self.selection);
            let recorded = AtomicU32::new(0);
            Arc::new(move |event: &PlayerEvent| {
                if !selection.is_current(ticket) {
                    return;
                }
                let playing = matches!(
                    event.kind,
                    Some(PlayerEventKind::Play | PlayerEventKind::TimeUpdate)
                );
                let current = event.episode.unwrap_or(episode);
                if !playing && event.episode.is_none() {
                    return;
                }
                if recorded.swap(current, Ordering::SeqCst) != current {
                    progress.record_episode(&title, current);
                }
            })
        };

        PlayerSession::start(
            port,
            allow_list,
            OverlayTimings::from(&self.config.overlay),
            Mount {
                ticket,
                resuming,
                muted,
            },
            Some(hook),
        )
    }

    /// Flush pending sync work and stop the scheduler.
    pub async fn shutdown(&self) {
        if let Some(sync) = self.progress.sync() {
            sync.shutdown().await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use chrono::TimeZone;
    use serde_json::json;
    use tsukimi_bridge::ChannelPort;
    use tsukimi_core::kv::MemoryKvStore;
    use tsukimi_core::models::{AiringStatus, EpisodeMapping};

    use crate::sync::tests::{identity, FakeRemote};

    #[derive(Debug, thiserror::Error)]
    #[error("mapping service down")]
    struct FakeMappingError;

    /// Episode ids are "ep-{n}". The first episode-mapping call is slow so
    /// tests can overlap two resolutions.
    #[derive(Default)]
    struct FakeMapping {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MappingService for FakeMapping {
        type Error = FakeMappingError;

        async fn title_mapping(&self, anilist_id: u64) -> Result<TitleMapping, FakeMappingError> {
            if self.fail {
                return Err(FakeMappingError);
            }
            Ok(TitleMapping {
                anilist_id,
                mal_id: Some(52991),
                episodes: vec![EpisodeMeta {
                    number: 1,
                    title: Some("The Journey's End".into()),
                    filler: false,
                }],
            })
        }

        async fn episode_mapping(
            &self,
            _anilist_id: u64,
        ) -> Result<EpisodeMapping, FakeMappingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = if call == 0 { 5 } else { 1 };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            if self.fail {
                return Err(FakeMappingError);
            }
            Ok((1..=10).map(|n| (n, format!("ep-{n}"))).collect())
        }
    }

    type TestRuntime = Runtime<MemoryKvStore, FakeRemote, FakeMapping>;

    fn runtime(remote: &Arc<FakeRemote>, mapping: FakeMapping) -> TestRuntime {
        Runtime::new(
            AppConfig::default(),
            SourceCatalog::embedded(),
            MemoryKvStore::new(),
            Some(Arc::clone(remote)),
            mapping,
        )
    }

    fn request(source: &str, language: Language, episode: u32) -> StreamRequest {
        StreamRequest {
            title_id: 154587,
            external_id: None,
            episode,
            source_id: source.into(),
            language,
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_writes_reach_remote_after_debounce() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let mut events = rt.sync_events().unwrap();
        rt.sign_in(identity()).await.unwrap();

        let frieren = TitleRef::series(154587, "Frieren");
        rt.record_episode(&frieren, 3).unwrap();
        rt.record_episode(&frieren, 4).unwrap();
        rt.remove(21);

        assert_eq!(events.recv().await.unwrap(), SyncEvent::Flushed { count: 2 });
        let pushes = remote.pushes.lock().unwrap();
        let (_, batch) = &pushes[0];
        match batch.get("154587") {
            Some(tsukimi_core::models::SyncOp::Upsert(entry)) => {
                assert_eq!(entry.last_episode_watched, 4)
            }
            other => panic!("unexpected op {other:?}"),
        }
        assert_eq!(batch.get("21"), Some(&tsukimi_core::models::SyncOp::Delete));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_reconciles_both_ways() {
        let remote = Arc::new(FakeRemote::default());
        let old = chrono::Utc.timestamp_millis_opt(1_600_000_000_000).unwrap();
        let newer = chrono::Utc.timestamp_millis_opt(1_900_000_000_000).unwrap();
        remote.remote_map.lock().unwrap().insert(
            "1".into(),
            ProgressEntry::new(&TitleRef::series(1, "Remote newer"), 9, newer),
        );
        remote.remote_map.lock().unwrap().insert(
            "2".into(),
            ProgressEntry::new(&TitleRef::series(2, "Remote older"), 1, old),
        );

        let rt = runtime(&remote, FakeMapping::default());
        let mut events = rt.sync_events().unwrap();
        rt.store()
            .record_episode_at(&TitleRef::series(1, "Local older"), 2, old);
        rt.store().record_episode(&TitleRef::series(2, "Local newer"), 5);

        let outcome = rt.sign_in(identity()).await.unwrap();
        assert_eq!(outcome.pulled, vec!["1".to_string()]);
        assert_eq!(rt.store().get(1).unwrap().last_episode_watched, 9);
        assert_eq!(rt.store().get(2).unwrap().last_episode_watched, 5);

        assert_eq!(events.recv().await.unwrap(), SyncEvent::Flushed { count: 1 });
        let pushes = remote.pushes.lock().unwrap();
        assert!(pushes[0].1.get("2").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_out_drops_unflushed_changes() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let mut events = rt.sync_events().unwrap();
        rt.sign_in(identity()).await.unwrap();
        rt.record_access(&TitleRef::series(7, "Show"));
        rt.sign_out();

        assert_eq!(events.recv().await.unwrap(), SyncEvent::Discarded { count: 1 });
        assert!(rt.identity().is_none());
        // Local progress is untouched.
        assert!(rt.store().get(7).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_while_signed_out_survives_sign_in() {
        let remote = Arc::new(FakeRemote::default());
        let watched = chrono::Utc.timestamp_millis_opt(1_600_000_000_000).unwrap();
        remote.remote_map.lock().unwrap().insert(
            "5".into(),
            ProgressEntry::new(&TitleRef::series(5, "Show"), 7, watched),
        );

        let rt = runtime(&remote, FakeMapping::default());
        let mut events = rt.sync_events().unwrap();
        rt.sign_in(identity()).await.unwrap();
        assert_eq!(rt.store().get(5).unwrap().last_episode_watched, 7);

        rt.sign_out();
        assert!(rt.remove(5));
        assert!(rt.store().tombstones().contains_key("5"));

        let outcome = rt.sign_in(identity()).await.unwrap();
        assert!(outcome.pulled.is_empty());
        assert!(rt.store().get(5).is_none());
        assert!(rt.store().tombstones().is_empty());

        assert_eq!(events.recv().await.unwrap(), SyncEvent::Flushed { count: 1 });
        let pushes = remote.pushes.lock().unwrap();
        assert_eq!(
            pushes[0].1.get("5"),
            Some(&tsukimi_core::models::SyncOp::Delete)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_in_removal_leaves_no_tombstone() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        rt.sign_in(identity()).await.unwrap();
        rt.record_access(&TitleRef::series(8, "Show"));
        assert!(rt.remove(8));
        assert!(rt.store().tombstones().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_resolution_is_suppressed() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());

        let first = request("v2", Language::Sub, 4);
        let second = request("v2", Language::Sub, 5);
        let (old, new) = tokio::join!(rt.resolve_stream(&first), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            rt.resolve_stream(&second).await
        });

        // The episode 4 lookup finishes last but must not be applied.
        assert_eq!(old.unwrap(), None);
        let new = new.unwrap().unwrap();
        assert_eq!(
            new.url().map(|u| u.as_str()),
            Some("https://megaplay.buzz/stream/s-2/ep-5/sub")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_v2_pending_until_mapping_loads() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let req = request("v2", Language::Sub, 5);

        assert_eq!(rt.resolve_cached(&req).unwrap(), StreamResolution::Pending);
        assert!(rt.resolve_stream(&req).await.unwrap().unwrap().is_ready());
        // Now cached.
        assert!(rt.resolve_cached(&req).unwrap().is_ready());
        assert_eq!(
            rt.resolve_cached(&request("v2", Language::Sub, 11)).unwrap(),
            StreamResolution::Unavailable
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mapping_failure_is_failed_not_cached() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(
            &remote,
            FakeMapping {
                fail: true,
                ..FakeMapping::default()
            },
        );
        let req = request("v2", Language::Sub, 5);
        assert_eq!(
            rt.resolve_stream(&req).await.unwrap(),
            Some(StreamResolution::Failed("mapping service down".into()))
        );
        assert_eq!(rt.resolve_cached(&req).unwrap(), StreamResolution::Pending);
    }

    #[tokio::test]
    async fn test_gated_pair_never_resolves() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let err = rt
            .resolve_stream(&request("animepahe", Language::Hindi, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Core(TsukimiError::UnsupportedLanguage { .. })
        ));
    }

    #[tokio::test]
    async fn test_external_id_loaded_from_mapping() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let resolution = rt
            .resolve_stream(&request("vidlink", Language::Dub, 2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            resolution.url().map(|u| u.as_str()),
            Some("https://vidlink.pro/anime/52991/2/dub?fallback=true")
        );
    }

    #[tokio::test]
    async fn test_episode_list_for_releasing_title() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let media = MediaInfo {
            id: 101,
            status: AiringStatus::Releasing,
            total_episodes: Some(24),
            released_episodes: Some(10),
            next_airing_episode: Some(11),
        };

        let episodes = rt.episodes(&media).await;
        assert_eq!(episodes.len(), 10);
        assert_eq!(episodes.last().map(|e| e.number), Some(10));
        assert_eq!(episodes[0].title.as_deref(), Some("The Journey's End"));
        assert_eq!(rt.episode_pages(&media), vec![1..=10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_player_telemetry_records_progress() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let port = ChannelPort::new();
        let frieren = TitleRef::series(154587, "Frieren");

        let session = rt.open_player(&port, frieren.clone(), 3, false);
        port.post(
            "https://evil.example",
            json!({ "type": "PLAYER_EVENT", "data": { "event": "play" } }),
        );
        assert!(rt.store().get(154587).is_none());

        port.post(
            "https://megaplay.buzz",
            json!({ "type": "PLAYER_EVENT", "data": { "event": "play" } }),
        );
        assert_eq!(rt.store().get(154587).unwrap().last_episode_watched, 3);

        // The player moved on to the next episode by itself.
        port.post(
            "https://megaplay.buzz",
            json!({ "type": "PLAYER_EVENT", "data": { "event": "timeupdate", "episode": 4 } }),
        );
        assert_eq!(rt.store().get(154587).unwrap().last_episode_watched, 4);
        drop(session);

        // A returning viewer gets the resume banner.
        let session = rt.open_player(&port, frieren, 4, false);
        settle().await;
        assert_eq!(
            session.overlay_state(),
            tsukimi_core::overlay::OverlayState::Resuming
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_player_stops_recording() {
        let remote = Arc::new(FakeRemote::default());
        let rt = runtime(&remote, FakeMapping::default());
        let port = ChannelPort::new();

        let _session = rt.open_player(&port, TitleRef::series(154587, "Frieren"), 3, false);
        // The user picked another stream while the old iframe is still alive.
        rt.resolve_stream(&request("vidsrc", Language::Dub, 12))
            .await
            .unwrap();

        port.post(
            "https://megaplay.buzz",
            json!({ "type": "PLAYER_EVENT", "data": { "event": "play" } }),
        );
        assert!(rt.store().get(154587).is_none());
    }
}
