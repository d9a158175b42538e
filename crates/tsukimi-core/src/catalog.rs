use serde::{Deserialize, Serialize};

use crate::error::TsukimiError;
use crate::models::{Language, SourceCapabilities};

/// Embedded source provider database.
const EMBEDDED_DB: &str = include_str!("../data/sources.toml");

/// How a source turns a selection into a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolver {
    /// Built from the catalog id alone.
    Template { template: String },
    /// Needs the secondary external id (`{external_id}`).
    ExternalId { template: String },
    /// Needs the per-episode provider id table (`{episode_id}`).
    EpisodeMapping { template: String },
}

impl Resolver {
    pub fn template(&self) -> &str {
        match self {
            Self::Template { template }
            | Self::ExternalId { template }
            | Self::EpisodeMapping { template } => template,
        }
    }
}

/// Definition of a streaming source provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable identifier used in selections and config (e.g. "vidsrc").
    pub id: String,
    /// Display name.
    pub name: String,
    /// Origins the source's player iframe posts messages from.
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(flatten)]
    pub capabilities: SourceCapabilities,
    pub resolver: Resolver,
    /// Whether this source is offered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl SourceDescriptor {
    pub fn available_languages(&self) -> Vec<Language> {
        Language::ALL
            .iter()
            .copied()
            .filter(|lang| self.capabilities.allows(*lang))
            .collect()
    }

    fn validate(&self) -> Result<(), TsukimiError> {
        let template = self.resolver.template();
        let (needs_external, needs_episode_id) = match self.resolver {
            Resolver::Template { .. } => (false, false),
            Resolver::ExternalId { .. } => (true, false),
            Resolver::EpisodeMapping { .. } => (false, true),
        };

        if needs_external && !template.contains("{external_id}") {
            return Err(TsukimiError::Catalog(format!(
                "{}: external_id resolver without {{external_id}} placeholder",
                self.id
            )));
        }
        if needs_episode_id && !template.contains("{episode_id}") {
            return Err(TsukimiError::Catalog(format!(
                "{}: episode_mapping resolver without {{episode_id}} placeholder",
                self.id
            )));
        }
        if (needs_external || needs_episode_id) != self.capabilities.requires_external_id_mapping {
            return Err(TsukimiError::Catalog(format!(
                "{}: requires_external_id_mapping does not match its resolver",
                self.id
            )));
        }
        Ok(())
    }
}

/// Wrapper for TOML deserialization.
#[derive(Debug, Deserialize)]
struct SourceDbFile {
    #[serde(rename = "source")]
    sources: Vec<SourceDescriptor>,
}

/// A (source, language) pair that passed the capability gate.
///
/// Only [`SourceCatalog::gate`] can build one, so URL construction never
/// sees a combination the source does not offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedSelection {
    source: SourceDescriptor,
    language: Language,
}

impl GatedSelection {
    pub fn source(&self) -> &SourceDescriptor {
        &self.source
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

/// Database of known source providers.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    sources: Vec<SourceDescriptor>,
}

impl SourceCatalog {
    /// Load the embedded source database.
    pub fn embedded() -> Self {
        Self::from_toml(EMBEDDED_DB).expect("embedded sources.toml should be valid")
    }

    /// Load a source database from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, TsukimiError> {
        let db: SourceDbFile =
            toml::from_str(toml_str).map_err(|e| TsukimiError::Catalog(e.to_string()))?;
        for source in &db.sources {
            source.validate()?;
        }
        Ok(Self {
            sources: db.sources,
        })
    }

    /// Merge a user database into this one.
    /// Sources with matching ids are replaced; new sources are appended.
    pub fn merge_user(&mut self, user_db: &SourceCatalog) {
        for user_source in &user_db.sources {
            if let Some(pos) = self.sources.iter().position(|s| s.id == user_source.id) {
                self.sources[pos] = user_source.clone();
            } else {
                self.sources.push(user_source.clone());
            }
        }
    }

    /// Look up an enabled source by id.
    pub fn get(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.enabled && s.id == id)
    }

    /// Enabled sources in catalog order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// Check a (source, language) pair against the static compatibility table.
    pub fn gate(
        &self,
        source_id: &str,
        language: Language,
    ) -> Result<GatedSelection, TsukimiError> {
        let source = self
            .get(source_id)
            .ok_or_else(|| TsukimiError::UnknownSource(source_id.to_string()))?;
        if !source.capabilities.allows(language) {
            tracing::debug!(source = source_id, language = %language, "Language gated off");
            return Err(TsukimiError::UnsupportedLanguage {
                source_id: source_id.to_string(),
                language,
            });
        }
        Ok(GatedSelection {
            source: source.clone(),
            language,
        })
    }

    /// Languages whose controls are selectable for `source_id`.
    pub fn available_languages(&self, source_id: &str) -> Vec<Language> {
        self.get(source_id)
            .map(SourceDescriptor::available_languages)
            .unwrap_or_default()
    }

    /// Keep `wanted` if the source offers it, otherwise fall back to subtitles.
    pub fn fallback_language(&self, source_id: &str, wanted: Language) -> Language {
        match self.get(source_id) {
            Some(source) if source.capabilities.allows(wanted) => wanted,
            _ => Language::Sub,
        }
    }

    /// Origins of every enabled iframe-based source.
    pub fn player_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self
            .sources()
            .filter(|s| !s.capabilities.uses_native_player)
            .flat_map(|s| s.origins.iter().cloned())
            .collect();
        origins.sort();
        origins.dedup();
        origins
    }

    /// Number of source definitions, including disabled ones.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
