use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Release status, using AniList's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiringStatus {
    Finished,
    Releasing,
    NotYetReleased,
    Cancelled,
    Hiatus,
}

/// The subset of catalog metadata episode listing depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub id: u64,
    pub status: AiringStatus,
    /// Planned episode count, if announced.
    #[serde(default)]
    pub total_episodes: Option<u32>,
    /// Episodes aired so far, for titles still releasing.
    #[serde(default)]
    pub released_episodes: Option<u32>,
    #[serde(default)]
    pub next_airing_episode: Option<u32>,
}

/// Per-episode display metadata from the mapping service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub number: u32,
    pub title: Option<String>,
    #[serde(default)]
    pub filler: bool,
}

/// Episode number to provider episode id, needed by mapping-backed sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMapping {
    episodes: BTreeMap<u32, String>,
}

impl EpisodeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, episode: u32, provider_id: impl Into<String>) {
        self.episodes.insert(episode, provider_id.into());
    }

    pub fn provider_id(&self, episode: u32) -> Option<&str> {
        self.episodes.get(&episode).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

impl FromIterator<(u32, String)> for EpisodeMapping {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        Self {
            episodes: iter.into_iter().collect(),
        }
    }
}

/// Load state of auxiliary mapping metadata for one title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MappingState {
    #[default]
    NotLoaded,
    Loaded(EpisodeMapping),
    Failed(String),
}
