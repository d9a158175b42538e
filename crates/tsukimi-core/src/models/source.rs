use serde::{Deserialize, Serialize};

/// Audio/subtitle variant requested from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Sub,
    Dub,
    Hindi,
}

impl Language {
    pub const ALL: &[Language] = &[Self::Sub, Self::Dub, Self::Hindi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sub => "sub",
            Self::Dub => "dub",
            Self::Hindi => "hindi",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sub => "Sub",
            Self::Dub => "Dub",
            Self::Hindi => "Hindi",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sub" => Some(Self::Sub),
            "dub" => Some(Self::Dub),
            "hindi" => Some(Self::Hindi),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Static capability flags of a source provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCapabilities {
    #[serde(default)]
    pub supports_dub: bool,
    #[serde(default)]
    pub supports_hindi: bool,
    #[serde(default)]
    pub supports_subtitle_tracks: bool,
    #[serde(default)]
    pub uses_native_player: bool,
    #[serde(default)]
    pub requires_external_id_mapping: bool,
}

impl SourceCapabilities {
    /// Whether the language control for `language` is selectable.
    pub fn allows(&self, language: Language) -> bool {
        match language {
            Language::Sub => true,
            Language::Dub => self.supports_dub,
            Language::Hindi => self.supports_hindi,
        }
    }
}
