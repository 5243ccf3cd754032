//! `ElevenLabs` voice cloning adapter

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{AudioFormat, ProviderKind, SpeechProvider, SynthesisResult, rejection};
use crate::voice::VoiceSelection;
use crate::{Error, Result};

const PROVIDER: &str = "elevenlabs";

/// Renders external voice ids; text is sent verbatim
pub struct ElevenLabsSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

impl ElevenLabsSpeech {
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
impl SpeechProvider for ElevenLabsSpeech {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElevenLabs
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
        let voice_id = voice
            .external_id()
            .ok_or_else(|| Error::Config("ElevenLabs requires an external voice id".to_string()))?;

        let url = format!("{}/v1/text-to-speech/{voice_id}", self.base_url);
        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        tracing::debug!(voice_id, language, chars = text.chars().count(), "requesting speech");

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", "audio/mpeg")
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
