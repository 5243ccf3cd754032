//! Translation pre-pass
//!
//! Runs once over the whole rewritten script before chunking. The model is
//! told to leave markup untouched so wrappers and cues survive translation.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::{Error, Result};

const INSTRUCTION: &str = "Translate the following script into the language with code \"{lang}\". \
Keep every markup tag (such as <speak>, <break/>, <emphasis>), every bracketed cue (such as [laughs]) \
and every break marker exactly as written, and translate only the natural-language text. \
Reply with the translated script only.";

/// Translates a full script
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target_language`
    ///
    /// # Errors
    ///
    /// Returns `Translation` if the service fails or returns nothing
    async fn translate(&self, text: &str, target_language: &str) -> Result<String>;
}

/// Translation through the primary engine's text model
pub struct GeminiTranslator {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    system_instruction: Instruction,
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Instruction {
    parts: [OwnedPart; 1],
}

#[derive(Serialize)]
struct OwnedPart {
    text: String,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
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
struct ResponsePart {
    text: Option<String>,
}

impl GeminiTranslator {
    #[must_use]
    pub fn new(api_key: SecretString, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Build from configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` error if no primary engine key is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config
            .api_keys
            .gemini
            .as_ref()
            .ok_or_else(|| Error::Config("Gemini API key required for translation".to_string()))?;

        Ok(Self::new(
            SecretString::from(key.expose_secret().to_string()),
            config.providers.gemini_base_url.clone(),
            config.providers.translation_model.clone(),
        ))
    }
}

fn instruction_for(target_language: &str) -> String {
    INSTRUCTION.replace("{lang}", target_language)
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        let request = TranslateRequest {
            system_instruction: Instruction {
                parts: [OwnedPart {
                    text: instruction_for(target_language),
                }],
            },
            contents: [Content {
                parts: [Part { text }],
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        tracing::debug!(model = %self.model, target_language, "translating script");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Translation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Translation(format!("translation error {status}: {body}")));
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| Error::Translation(e.to_string()))?;

        let translated: String = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();

        let translated = translated.trim();
        if translated.is_empty() {
            return Err(Error::Translation("empty translation".to_string()));
        }

        Ok(translated.to_string())
    }
}
