//! Error types for the narration pipeline

use thiserror::Error;

/// Result type alias for narrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while narrating a script or running a live session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A chunk failed to synthesize; the run was aborted at this chunk
    #[error("chunk {index} of {total} failed: {source}")]
    ChunkSynthesis {
        /// 1-based index of the failing chunk
        index: usize,
        total: usize,
        source: Box<Error>,
    },

    /// Provider answered successfully but carried no audio payload
    #[error("no audio returned by provider")]
    NoAudioReturned,

    /// Provider answered with a non-success status
    #[error("{provider} rejected the request: {message}")]
    ProviderRejected {
        provider: &'static str,
        message: String,
    },

    /// Translation pre-pass failed (callers fall back to the source text)
    #[error("translation error: {0}")]
    Translation(String),

    /// Microphone could not be opened
    #[error("microphone access denied: {0}")]
    MicrophoneAccessDenied(String),

    /// Live channel error
    #[error("channel error: {0}")]
    Channel(String),

    /// Imported profile, rule set or script is malformed
    #[error("invalid imported data: {0}")]
    InvalidImportedData(String),

    /// Audio encoding, decoding or device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Script is empty after trimming
    #[error("script is empty")]
    EmptyScript,

    /// A production run is already in progress
    #[error("a production run is already in progress")]
    Busy,

    /// Production run was aborted by the caller
    #[error("production run aborted")]
    Aborted,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// 1-based index of the failing chunk, if this is a chunk failure
    #[must_use]
    pub const fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::ChunkSynthesis { index, .. } => Some(*index),
            _ => None,
        }
    }
}
