//! Finished narration output

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::Result;

/// Container of a master artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// PCM chunks muxed into a WAV container
    Wav,
    /// MPEG chunks concatenated as-is
    Mp3,
}

/// The concatenated audio of a whole script
#[derive(Debug, Clone)]
pub struct MasterArtifact {
    pub bytes: Vec<u8>,
    pub format: ArtifactFormat,
    /// Number of chunks rendered
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl MasterArtifact {
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self.format {
            ArtifactFormat::Wav => "audio/wav",
            ArtifactFormat::Mp3 => "audio/mpeg",
        }
    }

    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self.format {
            ArtifactFormat::Wav => "wav",
            ArtifactFormat::Mp3 => "mp3",
        }
    }

    /// Timestamped download name, e.g. `narration-20250101-120000.wav`
    #[must_use]
    pub fn file_name(&self, prefix: &str) -> String {
        format!(
            "{prefix}-{}.{}",
            self.created_at.format("%Y%m%d-%H%M%S"),
            self.extension()
        )
    }

    /// Write the artifact into `dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub async fn write_to(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name(prefix));
        tokio::fs::write(&path, &self.bytes).await?;

        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "artifact written");
        Ok(path)
    }
}
