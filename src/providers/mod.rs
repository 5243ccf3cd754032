//! Speech provider adapters
//!
//! Each adapter turns one chunk of text plus a voice selection into audio
//! bytes in a format the adapter declares up front. Adapters never retry:
//! the first failure propagates to the orchestrator.

mod elevenlabs;
mod fish_audio;
mod gemini;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub use elevenlabs::ElevenLabsSpeech;
pub use fish_audio::FishAudioSpeech;
pub use gemini::GeminiSpeech;
pub(crate) use gemini::SpeechConfig;

use crate::config::Config;
use crate::voice::{ModelTier, VoiceSelection};
use crate::{Error, Result};

/// Encoding of the bytes a provider returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "encoding")]
pub enum AudioFormat {
    /// Headerless little-endian 16-bit PCM
    Pcm16 { sample_rate: u32, channels: u16 },
    /// Self-describing MPEG audio
    Mpeg,
}

impl AudioFormat {
    /// Raw PCM needs a WAV container before it is playable
    #[must_use]
    pub const fn needs_container(self) -> bool {
        matches!(self, Self::Pcm16 { .. })
    }
}

/// Audio for one chunk
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub format: AudioFormat,
}

/// Speech synthesis backend
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Which service this adapter talks to
    fn kind(&self) -> ProviderKind;

    /// Format of every [`SynthesisResult`] this adapter returns
    fn output_format(&self) -> AudioFormat;

    /// Render one chunk
    ///
    /// # Errors
    ///
    /// Returns `ProviderRejected` on a non-success response and
    /// `NoAudioReturned` when a successful response carries no audio
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelection,
        language: &str,
    ) -> Result<SynthesisResult>;
}

/// Available speech services
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Primary engine with prebuilt voices and induced identities
    #[default]
    Gemini,
    /// Voice cloning service A
    #[serde(rename = "elevenlabs")]
    ElevenLabs,
    /// Voice cloning service B
    FishAudio,
}

impl ProviderKind {
    pub const ALL: [Self; 3] = [Self::Gemini, Self::ElevenLabs, Self::FishAudio];

    /// Stable identifier used in config, CLI and API
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::ElevenLabs => "elevenlabs",
            Self::FishAudio => "fish-audio",
        }
    }

    /// Whether this service renders external voice ids rather than prebuilt voices
    #[must_use]
    pub const fn is_clone_service(self) -> bool {
        matches!(self, Self::ElevenLabs | Self::FishAudio)
    }

    /// Whether an API key for this service is configured
    #[must_use]
    pub const fn is_configured(self, config: &Config) -> bool {
        match self {
            Self::Gemini => config.api_keys.gemini.is_some(),
            Self::ElevenLabs => config.api_keys.elevenlabs.is_some(),
            Self::FishAudio => config.api_keys.fish_audio.is_some(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "elevenlabs" | "eleven-labs" => Ok(Self::ElevenLabs),
            "fish-audio" | "fish_audio" | "fish" => Ok(Self::FishAudio),
            other => Err(Error::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// Build the adapter for `kind` from configuration
///
/// # Errors
///
/// Returns `Config` error if the service has no API key configured
pub fn build_provider(
    kind: ProviderKind,
    config: &Config,
    tier: ModelTier,
) -> Result<Box<dyn SpeechProvider>> {
    let p = &config.providers;
    let provider: Box<dyn SpeechProvider> = match kind {
        ProviderKind::Gemini => {
            let key = require_key(config.api_keys.gemini.as_ref(), kind)?;
            let model = match tier {
                ModelTier::Flash => &p.gemini_flash_model,
                ModelTier::Pro => &p.gemini_pro_model,
            };
            Box::new(GeminiSpeech::new(key, p.gemini_base_url.clone(), model.clone()))
        }
        ProviderKind::ElevenLabs => {
            let key = require_key(config.api_keys.elevenlabs.as_ref(), kind)?;
            Box::new(ElevenLabsSpeech::new(
                key,
                p.elevenlabs_base_url.clone(),
                p.elevenlabs_model.clone(),
            ))
        }
        ProviderKind::FishAudio => {
            let key = require_key(config.api_keys.fish_audio.as_ref(), kind)?;
            Box::new(FishAudioSpeech::new(
                key,
                p.fish_audio_base_url.clone(),
                p.fish_audio_model.clone(),
            ))
        }
    };

    tracing::debug!(provider = %kind, ?tier, "speech provider ready");
    Ok(provider)
}

fn require_key(key: Option<&SecretString>, kind: ProviderKind) -> Result<SecretString> {
    key.map(|k| SecretString::from(k.expose_secret().to_string()))
        .ok_or_else(|| Error::Config(format!("{kind} API key not configured")))
}

/// Turn a non-success response into `ProviderRejected`
///
/// JSON bodies are searched for the provider's own message under
/// `error.message`, `detail.message`, `detail` or `message`.
pub(crate) async fn rejection(provider: &'static str, response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = provider_message(&body).unwrap_or_else(|| body.trim().to_string());

    tracing::error!(provider, %status, %message, "provider rejected request");
    Error::ProviderRejected {
        provider,
        message: if message.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {message}")
        },
    }
}

fn provider_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    [
        json.pointer("/error/message"),
        json.pointer("/detail/message"),
        json.get("detail"),
        json.get("message"),
    ]
    .into_iter()
    .flatten()
    .find_map(|v| v.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::NarratorConfigFile;

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("ElevenLabs".parse::<ProviderKind>().unwrap(), ProviderKind::ElevenLabs);
        assert_eq!("fish_audio".parse::<ProviderKind>().unwrap(), ProviderKind::FishAudio);
        assert!("polly".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn provider_kind_serde_matches_display() {
        for kind in ProviderKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn missing_key_is_config_error() {
        let config = Config::from_sources(NarratorConfigFile::default(), |_| None);
        for kind in ProviderKind::ALL {
            assert!(!kind.is_configured(&config));
            assert!(matches!(
                build_provider(kind, &config, ModelTier::Flash),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn tier_selects_model() {
        let config = Config::from_sources(NarratorConfigFile::default(), |key| {
            (key == "GEMINI_API_KEY").then(|| "k".to_string())
        });
        let provider = build_provider(ProviderKind::Gemini, &config, ModelTier::Pro).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Gemini);
        assert!(provider.output_format().needs_container());
    }

    #[test]
    fn provider_message_extraction() {
        assert_eq!(
            provider_message(r#"{"detail":{"status":"voice_not_found","message":"A voice with id 'x' was not found"}}"#),
            Some("A voice with id 'x' was not found".to_string())
        );
        assert_eq!(
            provider_message(r#"{"error":{"code":400,"message":"API key not valid"}}"#),
            Some("API key not valid".to_string())
        );
        assert_eq!(provider_message(r#"{"detail":"quota exceeded"}"#), Some("quota exceeded".to_string()));
        assert_eq!(provider_message("<html>bad gateway</html>"), None);
    }
}
