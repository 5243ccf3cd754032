//! Configuration management
//!
//! Settings are resolved once at startup (env > toml > default) into an
//! explicit [`Config`] that is passed by reference to the orchestrator and
//! provider adapters.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::audio::{CAPTURE_SAMPLE_RATE, DEFAULT_FRAME_SAMPLES, PLAYBACK_SAMPLE_RATE};
use crate::text::{DEFAULT_MAX_CHARS, RewriteMode};
use file::NarratorConfigFile;

/// Default pause between chunk requests
const DEFAULT_CHUNK_PAUSE_MS: u64 = 500;

/// Default HTTP port
const DEFAULT_PORT: u16 = 18800;

/// Narrator configuration
#[derive(Debug)]
pub struct Config {
    /// API keys
    pub api_keys: ApiKeys,

    /// Narration pipeline configuration
    pub narration: NarrationConfig,

    /// Provider endpoints and models
    pub providers: ProvidersConfig,

    /// Live duplex session configuration
    pub live: LiveConfig,

    /// HTTP API server configuration
    pub server: ServerConfig,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Primary engine key (speech, translation, live)
    pub gemini: Option<SecretString>,

    /// `ElevenLabs` API key
    pub elevenlabs: Option<SecretString>,

    /// Fish Audio API key
    pub fish_audio: Option<SecretString>,
}

/// Narration pipeline configuration
#[derive(Debug, Clone)]
pub struct NarrationConfig {
    /// Max characters per provider request
    pub max_chunk_chars: usize,

    /// Pause between chunk requests
    pub chunk_pause: Duration,

    /// Language scripts are authored in; other targets trigger translation
    pub default_language: String,

    /// How pronunciation rules are applied
    pub rewrite_mode: RewriteMode,

    /// Directory artifacts are written to
    pub output_dir: PathBuf,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHARS,
            chunk_pause: Duration::from_millis(DEFAULT_CHUNK_PAUSE_MS),
            default_language: "en".to_string(),
            rewrite_mode: RewriteMode::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Provider endpoints and models
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub gemini_base_url: String,
    /// Model for [`crate::voice::ModelTier::Flash`]
    pub gemini_flash_model: String,
    /// Model for [`crate::voice::ModelTier::Pro`]
    pub gemini_pro_model: String,
    /// Text model for the translation pre-pass
    pub translation_model: String,
    pub elevenlabs_base_url: String,
    pub elevenlabs_model: String,
    pub fish_audio_base_url: String,
    pub fish_audio_model: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_flash_model: "gemini-2.5-flash-preview-tts".to_string(),
            gemini_pro_model: "gemini-2.5-pro-preview-tts".to_string(),
            translation_model: "gemini-2.5-flash".to_string(),
            elevenlabs_base_url: "https://api.elevenlabs.io".to_string(),
            elevenlabs_model: "eleven_multilingual_v2".to_string(),
            fish_audio_base_url: "https://api.fish.audio".to_string(),
            fish_audio_model: "s1".to_string(),
        }
    }
}

/// Live duplex session configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket endpoint (key appended at connect time)
    pub url: String,

    /// Live model identifier
    pub model: String,

    /// Microphone capture rate
    pub input_sample_rate: u32,

    /// Response audio rate
    pub output_sample_rate: u32,

    /// Samples per outbound frame
    pub frame_samples: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            input_sample_rate: CAPTURE_SAMPLE_RATE,
            output_sample_rate: PLAYBACK_SAMPLE_RATE,
            frame_samples: DEFAULT_FRAME_SAMPLES,
        }
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

impl Config {
    /// Load configuration from the environment and the standard config file
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// Environment values win over file values, which win over defaults.
    #[must_use]
    pub fn from_sources(fc: NarratorConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        let api_keys = ApiKeys {
            gemini: secret(
                env("GEMINI_API_KEY")
                    .or_else(|| env("GOOGLE_API_KEY"))
                    .or(fc.api_keys.gemini),
            ),
            elevenlabs: secret(env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs)),
            fish_audio: secret(env("FISH_AUDIO_API_KEY").or(fc.api_keys.fish_audio)),
        };

        let defaults = NarrationConfig::default();
        let narration = NarrationConfig {
            max_chunk_chars: env("NARRATOR_MAX_CHUNK_CHARS")
                .and_then(|s| s.parse().ok())
                .or(fc.narration.max_chunk_chars)
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_chunk_chars),
            chunk_pause: env("NARRATOR_CHUNK_PAUSE_MS")
                .and_then(|s| s.parse().ok())
                .or(fc.narration.chunk_pause_ms)
                .map_or(defaults.chunk_pause, Duration::from_millis),
            default_language: env("NARRATOR_LANGUAGE")
                .or(fc.narration.default_language)
                .unwrap_or(defaults.default_language),
            rewrite_mode: fc.narration.rewrite_mode.unwrap_or(defaults.rewrite_mode),
            output_dir: env("NARRATOR_OUTPUT_DIR")
                .or(fc.narration.output_dir)
                .map_or(defaults.output_dir, PathBuf::from),
        };

        let p = ProvidersConfig::default();
        let fp = fc.providers;
        let providers = ProvidersConfig {
            gemini_base_url: fp.gemini_base_url.unwrap_or(p.gemini_base_url),
            gemini_flash_model: env("NARRATOR_FLASH_MODEL")
                .or(fp.gemini_flash_model)
                .unwrap_or(p.gemini_flash_model),
            gemini_pro_model: env("NARRATOR_PRO_MODEL")
                .or(fp.gemini_pro_model)
                .unwrap_or(p.gemini_pro_model),
            translation_model: fp.translation_model.unwrap_or(p.translation_model),
            elevenlabs_base_url: fp.elevenlabs_base_url.unwrap_or(p.elevenlabs_base_url),
            elevenlabs_model: fp.elevenlabs_model.unwrap_or(p.elevenlabs_model),
            fish_audio_base_url: fp.fish_audio_base_url.unwrap_or(p.fish_audio_base_url),
            fish_audio_model: fp.fish_audio_model.unwrap_or(p.fish_audio_model),
        };

        let l = LiveConfig::default();
        let live = LiveConfig {
            url: fc.live.url.unwrap_or(l.url),
            model: env("NARRATOR_LIVE_MODEL")
                .or(fc.live.model)
                .unwrap_or(l.model),
            frame_samples: fc
                .live
                .frame_samples
                .filter(|&n| n > 0)
                .unwrap_or(l.frame_samples),
            ..l
        };

        let server = ServerConfig {
            port: env("NARRATOR_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
        };

        Self {
            api_keys,
            narration,
            providers,
            live,
            server,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(NarratorConfigFile::default(), env_of(&[]));
        assert_eq!(config.narration.max_chunk_chars, DEFAULT_MAX_CHARS);
        assert_eq!(config.narration.chunk_pause, Duration::from_millis(500));
        assert_eq!(config.narration.default_language, "en");
        assert_eq!(config.live.input_sample_rate, 16_000);
        assert_eq!(config.live.output_sample_rate, 24_000);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.api_keys.gemini.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = NarratorConfigFile::default();
        fc.narration.max_chunk_chars = Some(1000);
        fc.api_keys.gemini = Some("file-key".to_string());
        fc.server.port = Some(9000);

        let config = Config::from_sources(
            fc,
            env_of(&[("NARRATOR_MAX_CHUNK_CHARS", "2000"), ("GEMINI_API_KEY", "env-key")]),
        );

        assert_eq!(config.narration.max_chunk_chars, 2000);
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.api_keys.gemini.as_ref().map(|k| k.expose_secret().to_string()),
            Some("env-key".to_string())
        );
    }

    #[test]
    fn blank_keys_are_treated_as_missing() {
        let config = Config::from_sources(
            NarratorConfigFile::default(),
            env_of(&[("ELEVENLABS_API_KEY", "   ")]),
        );
        assert!(config.api_keys.elevenlabs.is_none());
    }

    #[test]
    fn zero_chunk_limit_falls_back_to_default() {
        let config = Config::from_sources(
            NarratorConfigFile::default(),
            env_of(&[("NARRATOR_MAX_CHUNK_CHARS", "0")]),
        );
        assert_eq!(config.narration.max_chunk_chars, DEFAULT_MAX_CHARS);
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let config = Config::from_sources(
            NarratorConfigFile::default(),
            env_of(&[("GEMINI_API_KEY", "super-secret")]),
        );
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
