use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a title is a single film or an episodic series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleKind {
    Movie,
    #[default]
    Series,
}

impl TitleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Some(Self::Movie),
            "series" | "tv" => Some(Self::Series),
            _ => None,
        }
    }
}

impl std::fmt::Display for TitleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display data the UI hands over when recording progress for a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRef {
    pub id: u64,
    /// `None` keeps the kind already stored; new entries default to series.
    pub kind: Option<TitleKind>,
    pub title: String,
    pub poster_url: Option<String>,
}

impl TitleRef {
    pub fn new(id: u64, title: impl Into<String>) -> Self {
        Self {
            id,
            kind: None,
            title: title.into(),
            poster_url: None,
        }
    }

    pub fn series(id: u64, title: impl Into<String>) -> Self {
        Self::new(id, title).with_kind(TitleKind::Series)
    }

    pub fn movie(id: u64, title: impl Into<String>) -> Self {
        Self::new(id, title).with_kind(TitleKind::Movie)
    }

    pub fn with_kind(mut self, kind: TitleKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Key under which this title is stored in the progress map.
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Watch state for one title, persisted as part of the progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub id: u64,
    #[serde(default)]
    pub kind: TitleKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub last_episode_watched: u32,
    /// Absent only on entries written before access tracking existed.
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl ProgressEntry {
    pub fn new(title: &TitleRef, episode: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: title.id,
            kind: title.kind.unwrap_or_default(),
            title: title.title.clone(),
            poster_url: title.poster_url.clone(),
            last_episode_watched: episode,
            last_accessed: Some(now),
        }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }

    /// Refresh display fields from the latest title data.
    pub fn refresh_display(&mut self, title: &TitleRef) {
        if let Some(kind) = title.kind {
            self.kind = kind;
        }
        if !title.title.is_empty() {
            self.title = title.title.clone();
        }
        if title.poster_url.is_some() {
            self.poster_url = title.poster_url.clone();
        }
    }
}

/// Local change notification emitted after every persisted mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressChange {
    Upserted(ProgressEntry),
    Removed(String),
    /// Several entries changed at once (remote merge).
    Replaced(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_json_uses_camel_case() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let entry = ProgressEntry::new(&TitleRef::series(101, "Frieren"), 3, now);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["lastEpisodeWatched"], 3);
        assert_eq!(json["lastAccessed"], 1_700_000_000_000_i64);
        assert_eq!(json["kind"], "series");
        assert!(json.get("posterUrl").is_some());
    }

    #[test]
    fn test_legacy_entry_without_access_time() {
        let entry: ProgressEntry =
            serde_json::from_str(r#"{"id": 7, "title": "Old", "lastEpisodeWatched": 2}"#).unwrap();
        assert_eq!(entry.last_accessed, None);
        assert_eq!(entry.kind, TitleKind::Series);
        assert_eq!(entry.last_episode_watched, 2);
    }

    #[test]
    fn test_refresh_keeps_kind_unless_given() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut entry = ProgressEntry::new(&TitleRef::movie(9, "Suzume"), 1, now);
        assert_eq!(entry.kind, TitleKind::Movie);

        entry.refresh_display(&TitleRef::new(9, ""));
        assert_eq!(entry.kind, TitleKind::Movie);
        assert_eq!(entry.title, "Suzume");

        entry.refresh_display(&TitleRef::series(9, "Suzume"));
        assert_eq!(entry.kind, TitleKind::Series);
    }

    #[test]
    fn test_new_entry_without_kind_is_series() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let entry = ProgressEntry::new(&TitleRef::new(3, "Show"), 1, now);
        assert_eq!(entry.kind, TitleKind::Series);
        assert_eq!(TitleKind::from_str_opt("MOVIE"), Some(TitleKind::Movie));
        assert_eq!(TitleKind::from_str_opt("ova"), None);
    }
}
