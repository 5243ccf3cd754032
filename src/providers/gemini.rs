//! Primary engine speech adapter

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{AudioFormat, ProviderKind, SpeechProvider, SynthesisResult, rejection};
use crate::audio::{PLAYBACK_SAMPLE_RATE, decode_base64};
use crate::voice::VoiceSelection;
use crate::{Error, Result};

const PROVIDER: &str = "gemini";

const OUTPUT_FORMAT: AudioFormat = AudioFormat::Pcm16 {
    sample_rate: PLAYBACK_SAMPLE_RATE,
    channels: 1,
};

/// Speech via `generateContent` with an audio response modality
///
/// Custom identities are rendered by prefixing the chunk with their style
/// instruction and using their base voice.
pub struct GeminiSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

/// Voice block shared with the live session setup
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpeechConfig<'a> {
    pub voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VoiceConfig<'a> {
    pub prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PrebuiltVoiceConfig<'a> {
    pub voice_name: &'a str,
}

impl<'a> SpeechConfig<'a> {
    pub(crate) const fn prebuilt(voice_name: &'a str) -> Self {
        Self {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig { voice_name },
            },
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

impl GeminiSpeech {
    /// Create an adapter for one model
    #[must_use]
    pub fn new(api_key: SecretString, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Model this adapter renders with
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Chunk text as sent to the engine, with the style instruction prefixed
fn styled_prompt(text: &str, voice: &VoiceSelection) -> String {
    match voice.style_instruction() {
        Some(instruction) => format!("Speak in this style: {instruction}\n\n{text}"),
        None => text.to_string(),
    }
}

#[async_trait]
impl SpeechProvider for GeminiSpeech {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn output_format(&self) -> AudioFormat {
        OUTPUT_FORMAT
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSelection,
        language: &str,
    ) -> Result<SynthesisResult> {
        let prompt = styled_prompt(text, voice);
        let base_voice = voice.base_voice();

        let request = GenerateRequest {
            contents: [Content {
                parts: [TextPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig::prebuilt(base_voice.name()),
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        tracing::debug!(
            model = %self.model,
            voice = %base_voice,
            language,
            chars = prompt.chars().count(),
            "requesting speech"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(PROVIDER, response).await);
        }

        let body: GenerateResponse = response.json().await?;
        let data = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data)
            .map(|d| d.data)
            .ok_or(Error::NoAudioReturned)?;

        let audio = decode_base64(&data)?;
        if audio.is_empty() {
            return Err(Error::NoAudioReturned);
        }

        Ok(SynthesisResult {
            audio,
            format: OUTPUT_FORMAT,
        })
    }
}
