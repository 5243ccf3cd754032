//! Fish Audio voice cloning adapter

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{AudioFormat, ProviderKind, SpeechProvider, SynthesisResult, rejection};
use crate::voice::VoiceSelection;
use crate::{Error, Result};

const PROVIDER: &str = "fish-audio";

/// Renders external reference ids; text is sent verbatim
pub struct FishAudioSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct FishRequest<'a> {
    text: &'a str,
    reference_id: &'a str,
    format: &'static str,
}

impl FishAudioSpeech {
    #[must_use]
    pub fn new(api_key: SecretString, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl SpeechProvider for FishAudioSpeech {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FishAudio
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Mpeg
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelection,
        language: &str,
    ) -> Result<SynthesisResult> {
        let reference_id = voice
            .external_id()
            .ok_or_else(|| Error::Config("Fish Audio requires an external voice id".to_string()))?;

        let request = FishRequest {
            text,
            reference_id,
            format: "mp3",
        };

        tracing::debug!(reference_id, language, chars = text.chars().count(), "requesting speech");

        let response = self
            .client
            .post(format!("{}/v1/tts", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .header("model", &self.model)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(PROVIDER, response).await);
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(Error::NoAudioReturned);
        }

        Ok(SynthesisResult {
            audio: audio.to_vec(),
            format: AudioFormat::Mpeg,
        })
    }
}
