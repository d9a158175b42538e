//! Stream resolution: a pure decision table from a gated selection plus
//! whatever metadata is loaded to a playable URL or a typed reason why not.

use url::Url;

use crate::catalog::{GatedSelection, Resolver};
use crate::models::{Language, MappingState};

/// Outcome of resolving a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamResolution {
    /// A URL the player can mount.
    Ready(Url),
    /// Required metadata (external id or episode mapping) is not loaded yet.
    /// The UI should show a loading state and resolve again later.
    Pending,
    /// The source has no stream for this episode. Try another source.
    Unavailable,
    /// Metadata fetch or URL construction failed.
    Failed(String),
}

impl StreamResolution {
    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Ready(url) => Some(url),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Everything a resolution depends on.
#[derive(Debug, Clone, Copy)]
pub struct StreamCriteria<'a> {
    pub title_id: u64,
    /// Secondary catalog id (e.g. MyAnimeList), when known.
    pub external_id: Option<u64>,
    pub episode: u32,
    pub selection: &'a GatedSelection,
    pub mapping: &'a MappingState,
}

/// Resolve a selection to a stream URL or a sentinel.
pub fn resolve(criteria: &StreamCriteria<'_>) -> StreamResolution {
    if criteria.episode == 0 {
        return StreamResolution::Unavailable;
    }

    let source = criteria.selection.source();
    let language = criteria.selection.language();
    let title_id = criteria.title_id.to_string();
    let episode = criteria.episode.to_string();
    let external_id = criteria.external_id.map(|id| id.to_string());

    let episode_id = match &source.resolver {
        Resolver::Template { .. } => None,
        Resolver::ExternalId { .. } => {
            if external_id.is_none() {
                tracing::debug!(source = %source.id, title_id, "External id not mapped yet");
                return StreamResolution::Pending;
            }
            None
        }
        Resolver::EpisodeMapping { .. } => match criteria.mapping {
            MappingState::NotLoaded => return StreamResolution::Pending,
            MappingState::Failed(reason) => return StreamResolution::Failed(reason.clone()),
            MappingState::Loaded(mapping) => match mapping.provider_id(criteria.episode) {
                Some(id) => Some(encode_segment(id)),
                None => {
                    tracing::debug!(
                        source = %source.id,
                        title_id,
                        episode = criteria.episode,
                        "Episode missing from mapping"
                    );
                    return StreamResolution::Unavailable;
                }
            },
        },
    };

    let lookup = |name: &str| -> Option<String> {
        match name {
            "id" => Some(title_id.clone()),
            "external_id" => external_id.clone(),
            "episode" => Some(episode.clone()),
            "episode_id" => episode_id.clone(),
            "lang" => Some(language.as_str().to_string()),
            "dub" => Some((language == Language::Dub).to_string()),
            _ => None,
        }
    };

    let built = match fill_template(source.resolver.template(), lookup) {
        Ok(built) => built,
        Err(reason) => return StreamResolution::Failed(reason),
    };
    match Url::parse(&built) {
        Ok(url) => StreamResolution::Ready(url),
        Err(e) => StreamResolution::Failed(format!("invalid stream URL {built}: {e}")),
    }
}

/// Substitute `{name}` placeholders. Unknown or unavailable names are errors.
fn fill_template(
    template: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, String> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("unclosed placeholder in {template}"))?;
        let name = &after[..end];
        let value = lookup(name).ok_or_else(|| format!("no value for placeholder {{{name}}}"))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
