//! TOML configuration file loading
//!
//! Supports `~/.config/script-narrator/config.toml` as a persistent config
//! source. All fields are optional: the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::text::RewriteMode;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NarratorConfigFile {
    /// Narration pipeline settings
    #[serde(default)]
    pub narration: NarrationFileConfig,

    /// Provider endpoints and models
    #[serde(default)]
    pub providers: ProvidersFileConfig,

    /// Live duplex session settings
    #[serde(default)]
    pub live: LiveFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Narration pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct NarrationFileConfig {
    /// Max characters per provider request
    pub max_chunk_chars: Option<usize>,

    /// Pause between chunk requests, in milliseconds
    pub chunk_pause_ms: Option<u64>,

    /// Language scripts are authored in (e.g. "en")
    pub default_language: Option<String>,

    /// "sequential" or "simultaneous"
    pub rewrite_mode: Option<RewriteMode>,

    /// Directory artifacts are written to
    pub output_dir: Option<String>,
}

/// Provider configuration
#[derive(Debug, Default, Deserialize)]
pub struct ProvidersFileConfig {
    pub gemini_base_url: Option<String>,
    pub gemini_flash_model: Option<String>,
    pub gemini_pro_model: Option<String>,
    pub translation_model: Option<String>,
    pub elevenlabs_base_url: Option<String>,
    pub elevenlabs_model: Option<String>,
    pub fish_audio_base_url: Option<String>,
    pub fish_audio_model: Option<String>,
}

/// Live session configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// WebSocket endpoint
    pub url: Option<String>,

    /// Live model identifier
    pub model: Option<String>,

    /// Samples per outbound microphone frame
    pub frame_samples: Option<usize>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub elevenlabs: Option<String>,
    pub fish_audio: Option<String>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,
}

/// Load the TOML config file from the standard path
///
/// Returns `NarratorConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> NarratorConfigFile {
    config_file_path().map_or_else(NarratorConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or unparsable files yield defaults.
pub fn load_config_file_from(path: &Path) -> NarratorConfigFile {
    if !path.exists() {
        return NarratorConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                NarratorConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            NarratorConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/script-narrator/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("script-narrator").join("config.toml"))
}
