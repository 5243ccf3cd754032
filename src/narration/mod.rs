//! Script-to-audio production
//!
//! A run rewrites pronunciations, optionally translates, splits the script
//! into chunks, renders every chunk with one provider in order and assembles
//! the results into a single master artifact. Any chunk failure aborts the
//! whole run; there is no partial output.

mod artifact;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

pub use artifact::{ArtifactFormat, MasterArtifact};

use crate::audio::{concatenate, mux_wav};
use crate::config::NarrationConfig;
use crate::providers::{AudioFormat, SpeechProvider};
use crate::text::{self, PronunciationRule, Wrapper};
use crate::translation::Translator;
use crate::voice::VoiceSelection;
use crate::{Error, Result};

/// Progress of the orchestrator, published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NarrationState {
    Idle,
    Translating,
    /// Rendering chunk `current` (1-based) of `total`
    Synthesizing { current: usize, total: usize },
    Concatenating,
    Ready,
    Failed { message: String },
}

impl NarrationState {
    /// Human-readable status line
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::Idle => "idle".to_string(),
            Self::Translating => "translating script".to_string(),
            Self::Synthesizing { current, total } => {
                format!("synthesizing chunk {current} of {total}")
            }
            Self::Concatenating => "assembling master".to_string(),
            Self::Ready => "ready".to_string(),
            Self::Failed { message } => format!("failed: {message}"),
        }
    }
}

/// One production run's input
#[derive(Debug, Clone, Default)]
pub struct ProductionRequest {
    pub script: String,
    pub rules: Vec<PronunciationRule>,
    pub voice: VoiceSelection,
    /// Target language; `None` means the configured default
    pub language: Option<String>,
}

/// Drives production runs; at most one runs at a time
pub struct NarrationOrchestrator {
    settings: NarrationConfig,
    translator: Option<Arc<dyn Translator>>,
    state_tx: watch::Sender<NarrationState>,
    abort_tx: watch::Sender<bool>,
    running: AtomicBool,
    last_artifact: Mutex<Option<Arc<MasterArtifact>>>,
}

/// Releases the run slot; an unfinished run falls back to `Idle`
struct RunGuard<'a> {
    orchestrator: &'a NarrationOrchestrator,
    settled: bool,
}

impl RunGuard<'_> {
    fn settle(mut self, state: NarrationState) {
        self.orchestrator.set_state(state);
        self.settled = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.orchestrator.set_state(NarrationState::Idle);
        }
        self.orchestrator.running.store(false, Ordering::Release);
    }
}

impl NarrationOrchestrator {
    #[must_use]
    pub fn new(settings: NarrationConfig) -> Self {
        let (state_tx, _) = watch::channel(NarrationState::Idle);
        let (abort_tx, _) = watch::channel(false);
        Self {
            settings,
            translator: None,
            state_tx,
            abort_tx,
            running: AtomicBool::new(false),
            last_artifact: Mutex::new(None),
        }
    }

    /// Enable the translation pre-pass
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> NarrationState {
        self.state_tx.borrow().clone()
    }

    /// Observe state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NarrationState> {
        self.state_tx.subscribe()
    }

    /// Whether a run is in progress
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Artifact of the most recent successful run
    #[must_use]
    pub fn last_artifact(&self) -> Option<Arc<MasterArtifact>> {
        self.last_artifact
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Request cancellation of the active run
    ///
    /// Takes effect before the next chunk is dispatched. Has no effect when
    /// nothing is running.
    pub fn abort(&self) {
        if self.is_busy() {
            tracing::info!("abort requested");
            self.abort_tx.send_replace(true);
        }
    }

    /// Produce a master artifact from a script
    ///
    /// # Errors
    ///
    /// - `EmptyScript` if the script is blank
    /// - `Busy` if another run is active
    /// - `ChunkSynthesis` carrying the 1-based index of the first failing chunk
    /// - `Aborted` if [`abort`](Self::abort) was called during the run
    pub async fn produce(
        &self,
        provider: &dyn SpeechProvider,
        request: ProductionRequest,
    ) -> Result<Arc<MasterArtifact>> {
        if request.script.trim().is_empty() {
            return Err(Error::EmptyScript);
        }
        if provider.kind().is_clone_service() && request.voice.external_id().is_none() {
            return Err(Error::Config(format!(
                "{} requires an external voice id",
                provider.kind()
            )));
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }

        let guard = RunGuard {
            orchestrator: self,
            settled: false,
        };
        self.abort_tx.send_replace(false);
        self.store_artifact(None);

        match self.run(provider, request).await {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                self.store_artifact(Some(Arc::clone(&artifact)));
                guard.settle(NarrationState::Ready);
                Ok(artifact)
            }
            Err(Error::Aborted) => {
                tracing::info!("production run aborted");
                Err(Error::Aborted)
            }
            Err(e) => {
                guard.settle(NarrationState::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        provider: &dyn SpeechProvider,
        request: ProductionRequest,
    ) -> Result<MasterArtifact> {
        let ProductionRequest {
            script,
            rules,
            voice,
            language,
        } = request;

        let language = language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_language.clone());

        let rewritten = text::rewrite(&script, &rules, self.settings.rewrite_mode);
        let prepared = self.translate(rewritten, &language).await;

        let wrapper = Wrapper::detect(&prepared);
        let chunks = text::chunk(&prepared, self.settings.max_chunk_chars);
        let total = chunks.len();

        tracing::info!(
            provider = %provider.kind(),
            chunks = total,
            language = %language,
            wrapper = wrapper.as_ref().map(Wrapper::name),
            "starting production run"
        );

        let mut abort_rx = self.abort_tx.subscribe();
        let mut parts = Vec::with_capacity(total);

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                self.pause(&mut abort_rx).await?;
            }
            if *abort_rx.borrow() {
                return Err(Error::Aborted);
            }

            let index = i + 1;
            self.set_state(NarrationState::Synthesizing {
                current: index,
                total,
            });

            let body = wrapper
                .as_ref()
                .map_or_else(|| chunk.clone(), |w| w.rewrap(chunk));

            let result = provider
                .synthesize(&body, &voice, &language)
                .await
                .map_err(|e| {
                    tracing::error!(chunk = index, total, error = %e, "chunk synthesis failed");
                    Error::ChunkSynthesis {
                        index,
                        total,
                        source: Box::new(e),
                    }
                })?;

            tracing::debug!(chunk = index, total, bytes = result.audio.len(), "chunk rendered");
            parts.push(result.audio);
        }

        self.set_state(NarrationState::Concatenating);

        let joined = concatenate(&parts);
        let (bytes, format) = match provider.output_format() {
            AudioFormat::Pcm16 {
                sample_rate,
                channels,
            } => (mux_wav(&joined, sample_rate, channels), ArtifactFormat::Wav),
            AudioFormat::Mpeg => (joined, ArtifactFormat::Mp3),
        };

        tracing::info!(chunks = total, bytes = bytes.len(), ?format, "master assembled");

        Ok(MasterArtifact {
            bytes,
            format,
            chunk_count: total,
            created_at: Utc::now(),
        })
    }

    /// Translate when the target differs from the authored language
    ///
    /// Failures keep the untranslated text.
    async fn translate(&self, text: String, language: &str) -> String {
        if language.eq_ignore_ascii_case(&self.settings.default_language) {
            return text;
        }
        let Some(translator) = &self.translator else {
            tracing::warn!(language, "no translator configured, narrating untranslated text");
            return text;
        };

        self.set_state(NarrationState::Translating);
        match translator.translate(&text, language).await {
            Ok(translated) => {
                tracing::info!(language, "script translated");
                translated
            }
            Err(e) => {
                tracing::warn!(language, error = %e, "translation failed, using source text");
                text
            }
        }
    }

    async fn pause(&self, abort_rx: &mut watch::Receiver<bool>) -> Result<()> {
        if self.settings.chunk_pause.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(self.settings.chunk_pause) => Ok(()),
            _ = abort_rx.wait_for(|&aborted| aborted) => Err(Error::Aborted),
        }
    }

    fn set_state(&self, state: NarrationState) {
        tracing::debug!(status = %state.status_text(), "narration state");
        self.state_tx.send_replace(state);
    }

    fn store_artifact(&self, artifact: Option<Arc<MasterArtifact>>) {
        *self
            .last_artifact
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = artifact;
    }
}
