use std::collections::BTreeSet;
use std::fmt;

use url::Url;

use tsukimi_core::catalog::SourceCatalog;
use tsukimi_core::config::BridgeConfig;

use crate::error::BridgeError;

/// Serialized web origin: scheme, lowercase host and non-default port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin(String);

impl Origin {
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let url = Url::parse(raw.trim()).map_err(|e| BridgeError::InvalidOrigin {
            origin: raw.to_string(),
            reason: e.to_string(),
        })?;
        match url.origin() {
            origin @ url::Origin::Tuple(..) => Ok(Self(origin.ascii_serialization())),
            url::Origin::Opaque(_) => Err(BridgeError::OpaqueOrigin(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed set of origins whose messages may be inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    origins: BTreeSet<Origin>,
}

impl AllowList {
    /// Build from raw origin strings. Entries that do not parse are skipped.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.as_ref();
                Origin::parse(entry)
                    .map_err(|e| tracing::warn!(entry, error = %e, "Skipping allow-list entry"))
                    .ok()
            })
            .collect();
        Self { origins }
    }

    /// Player origins from the catalog plus any configured extras.
    pub fn for_players(catalog: &SourceCatalog, config: &BridgeConfig) -> Self {
        Self::new(
            catalog
                .player_origins()
                .iter()
                .chain(config.extra_origins.iter()),
        )
    }

    /// Whether a message claiming `origin` may pass. Unparseable and opaque
    /// origins (e.g. `"null"`) never pass.
    pub fn allows(&self, origin: &str) -> bool {
        Origin::parse(origin)
            .map(|o| self.origins.contains(&o))
            .unwrap_or(false)
    }

    pub fn origins(&self) -> impl Iterator<Item = &Origin> {
        self.origins.iter()
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}
