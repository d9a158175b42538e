//! Browser bindings: progress in `localStorage`, stream resolution, episode
//! paging and a trusted `window.postMessage` bridge for player telemetry.

mod local_storage;
mod port;

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use tsukimi_bridge::{AllowList, EventBridge, PlayerEvent, PlayerEventKind};
use tsukimi_core::catalog::SourceCatalog;
use tsukimi_core::config::AppConfig;
use tsukimi_core::episodes::{available_episode_count, episode_ranges};
use tsukimi_core::listeners::{Listener, Subscription};
use tsukimi_core::models::{
    EpisodeMapping, Language, MappingState, MediaInfo, ProgressChange, ProgressEntry, TitleKind,
    TitleRef,
};
use tsukimi_core::resolve::{resolve, StreamCriteria, StreamResolution};
use tsukimi_core::storage::ProgressStore;

pub use local_storage::LocalStorageKv;
pub use port::WindowMessagePort;

thread_local! {
    static CALLBACKS: RefCell<HashMap<u32, js_sys::Function>> = RefCell::new(HashMap::new());
}

static NEXT_CALLBACK: AtomicU32 = AtomicU32::new(1);

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(js_err)
}

fn parse_language(s: &str) -> Result<Language, JsValue> {
    Language::from_str_opt(s).ok_or_else(|| js_err(format!("unknown language: {s}")))
}

fn title_ref(
    title_id: u32,
    title: &str,
    poster_url: Option<String>,
    kind: Option<String>,
) -> Result<TitleRef, JsValue> {
    let mut title = TitleRef::new(u64::from(title_id), title);
    title.poster_url = poster_url;
    match kind.as_deref() {
        None => Ok(title),
        Some(raw) => TitleKind::from_str_opt(raw)
            .map(|kind| title.with_kind(kind))
            .ok_or_else(|| js_err(format!("unknown kind: {raw}"))),
    }
}

/// Invoke a registered JS callback with one serialized payload.
fn call_registered<T: Serialize>(id: u32, payload: &T) {
    let Some(callback) = CALLBACKS.with(|callbacks| callbacks.borrow().get(&id).cloned()) else {
        return;
    };
    match to_js(payload) {
        Ok(value) => {
            if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                tracing::warn!("Callback threw: {e:?}");
            }
        }
        Err(e) => tracing::debug!("Callback payload not serializable: {e:?}"),
    }
}

fn register_callback(callback: js_sys::Function) -> u32 {
    let id = NEXT_CALLBACK.fetch_add(1, Ordering::Relaxed);
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().insert(id, callback));
    id
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JsProgressChange<'a> {
    Upserted { entry: &'a ProgressEntry },
    Removed { key: &'a str },
    Replaced { keys: &'a [String] },
}

impl<'a> From<&'a ProgressChange> for JsProgressChange<'a> {
    fn from(change: &'a ProgressChange) -> Self {
        match change {
            ProgressChange::Upserted(entry) => Self::Upserted { entry },
            ProgressChange::Removed(key) => Self::Removed { key },
            ProgressChange::Replaced(keys) => Self::Replaced { keys },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum JsResolution {
    Ready { url: String },
    Pending,
    Unavailable,
    Failed { reason: String },
}

impl From<StreamResolution> for JsResolution {
    fn from(resolution: StreamResolution) -> Self {
        match resolution {
            StreamResolution::Ready(url) => Self::Ready { url: url.into() },
            StreamResolution::Pending => Self::Pending,
            StreamResolution::Unavailable => Self::Unavailable,
            StreamResolution::Failed(reason) => Self::Failed { reason },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsPlayerEvent<'a> {
    kind: Option<&'a str>,
    current_time: Option<f64>,
    duration: Option<f64>,
    episode: Option<u32>,
    muted: Option<bool>,
    near_end: bool,
}

impl<'a> JsPlayerEvent<'a> {
    fn new(event: &'a PlayerEvent, near_end_secs: f64) -> Self {
        let kind = event.kind.as_ref().map(|kind| match kind {
            PlayerEventKind::TimeUpdate => "timeupdate",
            PlayerEventKind::Play => "play",
            PlayerEventKind::Pause => "pause",
            PlayerEventKind::Seeked => "seeked",
            PlayerEventKind::Ended => "ended",
            PlayerEventKind::Complete => "complete",
            PlayerEventKind::Other(raw) => raw.as_str(),
        });
        Self {
            kind,
            current_time: event.current_time,
            duration: event.duration,
            episode: event.episode,
            muted: event.muted,
            near_end: event.is_near_end(near_end_secs),
        }
    }
}

#[wasm_bindgen]
pub struct Tsukimi {
    config: AppConfig,
    catalog: SourceCatalog,
    store: ProgressStore<LocalStorageKv>,
}

#[wasm_bindgen]
impl Tsukimi {
    /// `config_toml` replaces the built-in defaults when given.
    #[wasm_bindgen(constructor)]
    pub fn new(config_toml: Option<String>) -> Result<Tsukimi, JsValue> {
        let config = match config_toml {
            Some(toml) => AppConfig::from_toml(&toml).map_err(js_err)?,
            None => AppConfig::default(),
        };
        let store = ProgressStore::new(LocalStorageKv, config.storage.record_name.clone());
        Ok(Self {
            config,
            catalog: SourceCatalog::embedded(),
            store,
        })
    }

    /// Overlay user sources onto the embedded catalog.
    #[wasm_bindgen(js_name = mergeSources)]
    pub fn merge_sources(&mut self, sources_toml: &str) -> Result<(), JsValue> {
        let user = SourceCatalog::from_toml(sources_toml).map_err(js_err)?;
        self.catalog.merge_user(&user);
        Ok(())
    }

    // ── Progress ────────────────────────────────────────────────

    #[wasm_bindgen(js_name = continueWatching)]
    pub fn continue_watching(&self, limit: usize) -> Result<JsValue, JsValue> {
        to_js(&self.store.continue_watching(limit))
    }

    #[wasm_bindgen(js_name = getProgress)]
    pub fn get_progress(&self, title_id: u32) -> Result<JsValue, JsValue> {
        to_js(&self.store.get(u64::from(title_id)))
    }

    /// Returns the updated entry, or `null` when the write was suppressed.
    ///
    /// `kind` is `"movie"` or `"series"`; omit it to keep the stored kind.
    #[wasm_bindgen(js_name = recordEpisode)]
    pub fn record_episode(
        &self,
        title_id: u32,
        title: &str,
        poster_url: Option<String>,
        episode: u32,
        kind: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let title = title_ref(title_id, title, poster_url, kind)?;
        to_js(&self.store.record_episode(&title, episode))
    }

    #[wasm_bindgen(js_name = recordAccess)]
    pub fn record_access(
        &self,
        title_id: u32,
        title: &str,
        poster_url: Option<String>,
        kind: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let title = title_ref(title_id, title, poster_url, kind)?;
        to_js(&self.store.record_access(&title))
    }

    /// Call `callback` with `{ type, entry | key | keys }` after every
    /// progress change. Call `free()` on the result to unsubscribe.
    #[wasm_bindgen(js_name = onProgressChange)]
    pub fn on_progress_change(&self, callback: js_sys::Function) -> ProgressSubscription {
        let id = register_callback(callback);
        let listener: Listener<ProgressChange> = Arc::new(move |change: &ProgressChange| {
            call_registered(id, &JsProgressChange::from(change));
        });
        ProgressSubscription {
            id,
            _hook: self.store.subscribe(listener),
        }
    }

    #[wasm_bindgen(js_name = removeProgress)]
    pub fn remove_progress(&self, title_id: u32) -> bool {
        self.store.remove(u64::from(title_id))
    }

    /// True once `localStorage` rejected a write; progress is memory-only.
    #[wasm_bindgen(js_name = isStorageDegraded)]
    pub fn is_storage_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    // ── Resolution ──────────────────────────────────────────────

    /// Languages whose controls should be enabled for `source_id`.
    #[wasm_bindgen(js_name = availableLanguages)]
    pub fn available_languages(&self, source_id: &str) -> Vec<String> {
        self.catalog
            .available_languages(source_id)
            .iter()
            .map(|language| language.as_str().to_string())
            .collect()
    }

    #[wasm_bindgen(js_name = fallbackLanguage)]
    pub fn fallback_language(&self, source_id: &str, wanted: &str) -> Result<String, JsValue> {
        let wanted = parse_language(wanted)?;
        Ok(self
            .catalog
            .fallback_language(source_id, wanted)
            .as_str()
            .to_string())
    }

    /// Resolve one selection to `{ status, url?, reason? }`.
    ///
    /// `episode_map` is `undefined` while the provider episode table is
    /// loading, a `{ "<episode>": "<provider id>" }` object once loaded, or a
    /// string describing why loading failed.
    pub fn resolve(
        &self,
        source_id: &str,
        language: &str,
        title_id: u32,
        episode: u32,
        external_id: Option<u32>,
        episode_map: JsValue,
    ) -> Result<JsValue, JsValue> {
        let selection = self
            .catalog
            .gate(source_id, parse_language(language)?)
            .map_err(js_err)?;
        let mapping = mapping_state(episode_map)?;
        let resolution = resolve(&StreamCriteria {
            title_id: u64::from(title_id),
            external_id: external_id.map(u64::from),
            episode,
            selection: &selection,
            mapping: &mapping,
        });
        to_js(&JsResolution::from(resolution))
    }

    // ── Episodes ────────────────────────────────────────────────

    /// Page ranges as `[[start, end], ...]` for a `MediaInfo`-shaped object.
    #[wasm_bindgen(js_name = episodePages)]
    pub fn episode_pages(&self, media: JsValue) -> Result<JsValue, JsValue> {
        let media: MediaInfo = serde_wasm_bindgen::from_value(media).map_err(js_err)?;
        let pages: Vec<[u32; 2]> = episode_ranges(
            available_episode_count(&media),
            self.config.player.episodes_per_page,
        )
        .into_iter()
        .map(|range| [*range.start(), *range.end()])
        .collect();
        to_js(&pages)
    }

    #[wasm_bindgen(js_name = episodeCount)]
    pub fn episode_count(&self, media: JsValue) -> Result<u32, JsValue> {
        let media: MediaInfo = serde_wasm_bindgen::from_value(media).map_err(js_err)?;
        Ok(available_episode_count(&media))
    }

    // ── Player ──────────────────────────────────────────────────

    /// Listen for trusted player telemetry on `window`. `callback` receives
    /// one event object per message; call `free()` on the result to detach.
    #[wasm_bindgen(js_name = attachPlayer)]
    pub fn attach_player(&self, callback: js_sys::Function) -> Result<PlayerBridge, JsValue> {
        let port = WindowMessagePort::new().ok_or_else(|| js_err("no window"))?;
        let allow_list = AllowList::for_players(&self.catalog, &self.config.bridge);
        let bridge = EventBridge::attach(&port, allow_list);

        let id = register_callback(callback);
        let near_end = self.config.overlay.near_end_secs as f64;
        let listener: Listener<PlayerEvent> = Arc::new(move |event: &PlayerEvent| {
            call_registered(id, &JsPlayerEvent::new(event, near_end));
        });
        let hook = bridge.subscribe(listener);

        Ok(PlayerBridge {
            id,
            _hook: hook,
            bridge,
        })
    }
}

/// A live telemetry subscription. Detaches from `window` when freed.
#[wasm_bindgen]
pub struct PlayerBridge {
    id: u32,
    _hook: Subscription<PlayerEvent>,
    bridge: EventBridge,
}

#[wasm_bindgen]
impl PlayerBridge {
    #[wasm_bindgen(js_name = listenerCount)]
    pub fn listener_count(&self) -> usize {
        self.bridge.listener_count()
    }
}

impl Drop for PlayerBridge {
    fn drop(&mut self) {
        CALLBACKS.with(|callbacks| callbacks.borrow_mut().remove(&self.id));
    }
}

/// A live progress-change subscription.
#[wasm_bindgen]
pub struct ProgressSubscription {
    id: u32,
    _hook: Subscription<ProgressChange>,
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        CALLBACKS.with(|callbacks| callbacks.borrow_mut().remove(&self.id));
    }
}

fn mapping_state(value: JsValue) -> Result<MappingState, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(MappingState::NotLoaded);
    }
    if let Some(reason) = value.as_string() {
        return Ok(MappingState::Failed(reason));
    }
    let raw: HashMap<String, String> = serde_wasm_bindgen::from_value(value).map_err(js_err)?;
    Ok(MappingState::Loaded(episode_mapping_from(raw)))
}

/// Keys that are not episode numbers are dropped.
fn episode_mapping_from(raw: HashMap<String, String>) -> EpisodeMapping {
    raw.into_iter()
        .filter_map(|(episode, id)| episode.trim().parse::<u32>().ok().map(|n| (n, id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_episode_mapping_skips_non_numeric_keys() {
        let raw = HashMap::from([
            ("1".to_string(), "ep-1".to_string()),
            ("12".to_string(), "ep-12".to_string()),
            ("special".to_string(), "sp".to_string()),
            ("-3".to_string(), "neg".to_string()),
        ]);
        let mapping = episode_mapping_from(raw);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.provider_id(1), Some("ep-1"));
        assert_eq!(mapping.provider_id(12), Some("ep-12"));
    }

    #[test]
    fn test_resolution_shape() {
        let ready = JsResolution::from(StreamResolution::Ready(
            "https://vidsrc.cc/v2/embed/anime/ani21/12/dub".into(),
        ));
        assert_eq!(
            serde_json::to_value(&ready).unwrap(),
            json!({ "status": "ready", "url": "https://vidsrc.cc/v2/embed/anime/ani21/12/dub" })
        );
        assert_eq!(
            serde_json::to_value(JsResolution::from(StreamResolution::Pending)).unwrap(),
            json!({ "status": "pending" })
        );
        assert_eq!(
            serde_json::to_value(JsResolution::from(StreamResolution::Failed("timeout".into())))
                .unwrap(),
            json!({ "status": "failed", "reason": "timeout" })
        );
    }

    #[test]
    fn test_progress_change_shape() {
        let removed = ProgressChange::Removed("21".into());
        assert_eq!(
            serde_json::to_value(JsProgressChange::from(&removed)).unwrap(),
            json!({ "type": "removed", "key": "21" })
        );

        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let entry = ProgressEntry::new(&TitleRef::movie(9, "Suzume"), 1, now);
        let upserted = ProgressChange::Upserted(entry);
        let value = serde_json::to_value(JsProgressChange::from(&upserted)).unwrap();
        assert_eq!(value["type"], "upserted");
        assert_eq!(value["entry"]["id"], 9);
        assert_eq!(value["entry"]["kind"], "movie");
    }

    #[test]
    fn test_title_ref_kind_is_optional() {
        let title = title_ref(9, "Suzume", None, None).unwrap();
        assert_eq!(title.kind, None);
        let title = title_ref(9, "Suzume", Some("p.jpg".into()), Some("Movie".into())).unwrap();
        assert_eq!(title.kind, Some(TitleKind::Movie));
        assert_eq!(title.poster_url.as_deref(), Some("p.jpg"));
    }
}
