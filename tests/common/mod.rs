//! Shared test utilities

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use script_narrator::config::NarrationConfig;
use script_narrator::config::file::NarratorConfigFile;
use script_narrator::voice::VoiceSelection;
use script_narrator::{AudioFormat, Config, Error, ProviderKind, Result, SpeechProvider, SynthesisResult};

/// Provider that records every chunk and returns scripted audio
pub struct MockProvider {
    kind: ProviderKind,
    format: AudioFormat,
    /// 1-based chunk index that fails
    fail_on: Option<usize>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn pcm() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            format: AudioFormat::Pcm16 {
                sample_rate: 24_000,
                channels: 1,
            },
            fail_on: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn mpeg() -> Self {
        Self {
            kind: ProviderKind::ElevenLabs,
            format: AudioFormat::Mpeg,
            ..Self::pcm()
        }
    }

    pub fn failing_on(mut self, index: usize) -> Self {
        self.fail_on = Some(index);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Texts received, in dispatch order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// Audio returned for chunk `index`
pub fn chunk_audio(index: usize) -> Vec<u8> {
    vec![u8::try_from(index).unwrap(); 4]
}

#[async_trait]
impl SpeechProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn output_format(&self) -> AudioFormat {
        self.format
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSelection,
        _language: &str,
    ) -> Result<SynthesisResult> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(text.to_string());
            calls.len()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_on == Some(index) {
            return Err(Error::ProviderRejected {
                provider: "mock",
                message: "quota exceeded".to_string(),
            });
        }

        Ok(SynthesisResult {
            audio: chunk_audio(index),
            format: self.format,
        })
    }
}

/// Narration settings with no inter-chunk pause
pub fn fast_settings(max_chunk_chars: usize) -> NarrationConfig {
    NarrationConfig {
        max_chunk_chars,
        chunk_pause: Duration::ZERO,
        ..NarrationConfig::default()
    }
}

/// Config with the given environment pairs and no config file
pub fn config_with(pairs: &[(&str, &str)]) -> Config {
    let pairs: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_sources(NarratorConfigFile::default(), move |key| {
        pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
}
