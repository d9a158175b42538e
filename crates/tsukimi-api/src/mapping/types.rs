use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tsukimi_core::models::{EpisodeMapping, EpisodeMeta};

/// Alternate ids and episode metadata for one title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMapping {
    pub anilist_id: u64,
    /// MyAnimeList id, used by sources keyed on it.
    pub mal_id: Option<u64>,
    pub episodes: Vec<EpisodeMeta>,
}

/// Raw response from the title mapping service (`?anilist_id=`).
#[derive(Debug, Deserialize)]
pub(crate) struct MappingResponse {
    #[serde(default)]
    pub episodes: BTreeMap<String, RawEpisode>,
    #[serde(default)]
    pub mappings: RawIds,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawIds {
    #[serde(default)]
    pub mal_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEpisode {
    /// Titles keyed by language code (`en`, `x-jat`, `ja`).
    #[serde(default)]
    pub title: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub filler: bool,
}

impl MappingResponse {
    pub(crate) fn into_title_mapping(self, anilist_id: u64) -> TitleMapping {
        let mut episodes: Vec<EpisodeMeta> = self
            .episodes
            .into_iter()
            .filter_map(|(key, raw)| {
                // Specials use non-numeric keys ("S1"); only regular episodes are listed.
                let number = key.parse::<u32>().ok().filter(|n| *n > 0)?;
                let title = ["en", "x-jat", "ja"]
                    .iter()
                    .find_map(|lang| raw.title.get(*lang).cloned().flatten())
                    .filter(|t| !t.trim().is_empty());
                Some(EpisodeMeta {
                    number,
                    title,
                    filler: raw.filler,
                })
            })
            .collect();
        episodes.sort_by_key(|e| e.number);
        TitleMapping {
            anilist_id,
            mal_id: self.mappings.mal_id,
            episodes,
        }
    }
}

/// Raw response from the provider episode service (`/{anilist_id}`).
#[derive(Debug, Deserialize)]
pub(crate) struct EpisodeListResponse {
    #[serde(default)]
    pub episodes: Vec<RawProviderEpisode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawProviderEpisode {
    #[serde(default)]
    pub number: Value,
    #[serde(default)]
    pub id: Value,
}

impl EpisodeListResponse {
    /// Entries with an unusable number or id are skipped.
    pub(crate) fn into_mapping(self) -> EpisodeMapping {
        self.episodes
            .into_iter()
            .filter_map(|raw| {
                let number = match &raw.number {
                    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                }?;
                let id = match raw.id {
                    Value::String(s) if !s.is_empty() => s,
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                Some((number, id))
            })
            .collect()
    }
}
