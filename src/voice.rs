//! Voice identities used to render a chunk
//!
//! A selection is either a prebuilt voice of the primary engine, a custom
//! "induced" identity (style instruction on top of a prebuilt base voice), or
//! a voice hosted by an external cloning service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Prebuilt voices offered by the primary engine
pub const PREBUILT_VOICES: &[&str] = &[
    "Zephyr", "Puck", "Charon", "Kore", "Fenrir", "Leda", "Orus", "Aoede", "Callirrhoe",
    "Autonoe", "Enceladus", "Iapetus", "Umbriel", "Algieba", "Despina", "Erinome", "Algenib",
    "Rasalgethi", "Laomedeia", "Achernar", "Alnilam", "Schedar", "Gacrux", "Pulcherrima",
    "Achird", "Zubenelgenubi", "Vindemiatrix", "Sadachbia", "Sadaltager", "Sulafat",
];

/// Voice used when nothing else is configured
pub const DEFAULT_VOICE: &str = "Kore";

/// A named base acoustic identity of the primary engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrebuiltVoice(String);

impl PrebuiltVoice {
    /// Look up a prebuilt voice by name (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns error if the name is not in [`PREBUILT_VOICES`]
    pub fn new(name: &str) -> Result<Self> {
        PREBUILT_VOICES
            .iter()
            .find(|v| v.eq_ignore_ascii_case(name.trim()))
            .map(|v| Self((*v).to_string()))
            .ok_or_else(|| Error::Config(format!("unknown prebuilt voice: {name}")))
    }

    /// Canonical voice name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for PrebuiltVoice {
    fn default() -> Self {
        Self(DEFAULT_VOICE.to_string())
    }
}

impl TryFrom<String> for PrebuiltVoice {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<PrebuiltVoice> for String {
    fn from(value: PrebuiltVoice) -> Self {
        value.0
    }
}

impl fmt::Display for PrebuiltVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A custom induced identity
///
/// No model weights exist for it: the primary engine renders the base voice
/// and is steered by the free-text instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub name: String,
    /// Style descriptor, e.g. "warm, unhurried documentary narrator"
    pub instruction: String,
    pub base_voice: PrebuiltVoice,
}

impl VoiceProfile {
    /// Create a profile with a fresh id
    #[must_use]
    pub fn new(name: impl Into<String>, instruction: impl Into<String>, base_voice: PrebuiltVoice) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            instruction: instruction.into(),
            base_voice,
        }
    }
}

/// The identity used to render audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoiceSelection {
    /// Prebuilt voice of the primary engine
    Prebuilt { voice: PrebuiltVoice },
    /// Induced identity on top of a prebuilt voice
    Custom { profile: VoiceProfile },
    /// Voice id hosted by an external cloning service
    External { voice_id: String },
}

impl VoiceSelection {
    /// Prebuilt selection by name
    ///
    /// # Errors
    ///
    /// Returns error if the name is not a known prebuilt voice
    pub fn prebuilt(name: &str) -> Result<Self> {
        Ok(Self::Prebuilt {
            voice: PrebuiltVoice::new(name)?,
        })
    }

    /// Base acoustic identity for the primary engine and live sessions
    ///
    /// External voices have no counterpart there, so the default voice is used.
    #[must_use]
    pub fn base_voice(&self) -> PrebuiltVoice {
        match self {
            Self::Prebuilt { voice } => voice.clone(),
            Self::Custom { profile } => profile.base_voice.clone(),
            Self::External { .. } => PrebuiltVoice::default(),
        }
    }

    /// Style descriptor, present only for custom identities
    #[must_use]
    pub fn style_instruction(&self) -> Option<&str> {
        match self {
            Self::Custom { profile } => {
                let instruction = profile.instruction.trim();
                (!instruction.is_empty()).then_some(instruction)
            }
            _ => None,
        }
    }

    /// External provider voice id, if any
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        match self {
            Self::External { voice_id } => Some(voice_id),
            _ => None,
        }
    }
}

impl Default for VoiceSelection {
    fn default() -> Self {
        Self::Prebuilt {
            voice: PrebuiltVoice::default(),
        }
    }
}

/// Quality/speed profile of the primary engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Low latency
    #[default]
    Flash,
    /// Highest quality
    Pro,
}

impl FromStr for ModelTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flash" | "fast" => Ok(Self::Flash),
            "pro" | "studio" => Ok(Self::Pro),
            other => Err(Error::Config(format!("unknown model tier: {other}"))),
        }
    }
}
