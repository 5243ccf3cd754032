//! Live duplex voice session
//!
//! Microphone audio streams to a live model while its spoken reply streams
//! back and is played gaplessly. Two tasks run per session:
//!
//! - **outbound**: microphone frames → PCM16 → base64 → channel, in capture order
//! - **inbound**: channel events → transcript updates and scheduled playback
//!
//! A supervisor owns the microphone and performs teardown, which is reached
//! by [`DuplexSession::stop`], a channel error or the remote closing.

mod devices;
mod gemini_live;
mod scheduler;
mod transcript;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

pub use devices::{AudioDevices, AudioInput, SystemAudio};
pub use gemini_live::GeminiLiveConnector;
pub use scheduler::{PlaybackScheduler, Scheduled};
pub use transcript::{Speaker, Transcript, TranscriptLine};

use crate::audio::{SourceId, decode_base64, decode_pcm16, encode_base64, samples_to_pcm16_le};
use crate::config::LiveConfig;
use crate::voice::VoiceSelection;
use crate::{Error, Result};

/// Lifecycle of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Closed,
    Connecting,
    Open,
    Streaming,
    Flushing,
}

/// Event decoded from the live channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Transcription fragment of either side
    Transcript { speaker: Speaker, text: String },
    /// Base64 PCM16 response audio
    Audio { data: String },
    TurnComplete,
    /// Remote ended the session
    Closed,
}

/// Session configuration sent when the channel opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: Option<String>,
}

impl LiveSetup {
    /// Setup for a voice selection; custom identities become the system instruction
    #[must_use]
    pub fn for_voice(model: &str, voice: &VoiceSelection) -> Self {
        Self {
            model: model.to_string(),
            voice_name: voice.base_voice().name().to_string(),
            system_instruction: voice
                .style_instruction()
                .map(|style| format!("Speak in this style: {style}")),
        }
    }
}

/// One outbound microphone frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplexFrame {
    /// Base64 little-endian PCM16
    pub data: String,
    pub mime_type: String,
}

impl DuplexFrame {
    #[must_use]
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: encode_base64(&samples_to_pcm16_le(samples)),
            mime_type: format!("audio/pcm;rate={sample_rate}"),
        }
    }
}

/// Opens a live channel
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Connect and complete the setup exchange
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the connection or setup fails
    async fn connect(
        &self,
        setup: &LiveSetup,
    ) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)>;
}

/// Write half of a live channel
#[async_trait]
pub trait LiveSender: Send {
    /// # Errors
    ///
    /// Returns `Channel` if the frame cannot be sent
    async fn send_audio(&mut self, frame: &DuplexFrame) -> Result<()>;

    /// # Errors
    ///
    /// Returns `Channel` if the close handshake fails
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a live channel
#[async_trait]
pub trait LiveReceiver: Send {
    /// Next event, or `None` once the channel is gone
    ///
    /// Must be cancel-safe: events are not lost if the future is dropped.
    async fn next_event(&mut self) -> Option<Result<LiveEvent>>;
}

/// Notifications for the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    State(SessionState),
    /// Full transcript after a change
    Transcript(Vec<TranscriptLine>),
    Error(String),
}

#[derive(Clone)]
struct Notifier {
    state_tx: Arc<watch::Sender<SessionState>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Notifier {
    fn state(&self, state: SessionState) {
        tracing::debug!(?state, "live session state");
        self.state_tx.send_replace(state);
        let _ = self.events_tx.send(SessionEvent::State(state));
    }

    fn event(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}

struct ActiveSession {
    shutdown: Arc<watch::Sender<bool>>,
    supervisor: JoinHandle<()>,
}

/// A live conversation with the model
pub struct DuplexSession {
    connector: Arc<dyn LiveConnector>,
    devices: Arc<dyn AudioDevices>,
    settings: LiveConfig,
    notifier: Notifier,
    active: Option<ActiveSession>,
}

impl DuplexSession {
    /// Create a closed session and the receiver for its events
    #[must_use]
    pub fn new(
        connector: Arc<dyn LiveConnector>,
        devices: Arc<dyn AudioDevices>,
        settings: LiveConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (state_tx, _) = watch::channel(SessionState::Closed);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            connector,
            devices,
            settings,
            notifier: Notifier {
                state_tx: Arc::new(state_tx),
                events_tx,
            },
            active: None,
        };
        (session, events_rx)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.notifier.state_tx.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.notifier.state_tx.subscribe()
    }

    /// Connect, open devices and start streaming
    ///
    /// # Errors
    ///
    /// - `Channel` if the session is already running or the connection fails
    /// - `MicrophoneAccessDenied` if the microphone cannot be opened
    pub async fn start(&mut self, voice: &VoiceSelection) -> Result<()> {
        if self.state() != SessionState::Closed {
            return Err(Error::Channel("session already active".to_string()));
        }
        // Reap a session the remote already tore down
        if let Some(previous) = self.active.take() {
            let _ = previous.supervisor.await;
        }

        let notifier = self.notifier.clone();
        notifier.state(SessionState::Connecting);

        let setup = LiveSetup::for_voice(&self.settings.model, voice);
        let (mut sender, receiver) = match self.connector.connect(&setup).await {
            Ok(halves) => halves,
            Err(e) => {
                tracing::error!(error = %e, "live connection failed");
                notifier.state(SessionState::Closed);
                return Err(e);
            }
        };
        notifier.state(SessionState::Open);
        tracing::info!(model = %setup.model, voice = %setup.voice_name, "live session open");

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let mut output = match self
            .devices
            .open_output(self.settings.output_sample_rate, completions_tx)
        {
            Ok(output) => output,
            Err(e) => {
                let _ = sender.close().await;
                notifier.state(SessionState::Closed);
                return Err(e);
            }
        };

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let mic = match self.devices.open_input(
            self.settings.input_sample_rate,
            self.settings.frame_samples,
            frames_tx,
        ) {
            Ok(mic) => mic,
            Err(e) => {
                tracing::error!(error = %e, "microphone unavailable");
                output.close();
                let _ = sender.close().await;
                notifier.state(SessionState::Closed);
                return Err(match e {
                    Error::MicrophoneAccessDenied(_) => e,
                    other => Error::MicrophoneAccessDenied(other.to_string()),
                });
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);
        let (close_tx, close_rx) = oneshot::channel();

        let outbound = tokio::spawn(outbound(
            sender,
            frames_rx,
            close_rx,
            self.settings.input_sample_rate,
            Arc::clone(&shutdown),
            notifier.clone(),
        ));

        let inbound = tokio::spawn(inbound(
            receiver,
            PlaybackScheduler::new(output),
            completions_rx,
            self.settings.output_sample_rate,
            shutdown_rx.clone(),
            Arc::clone(&shutdown),
            notifier.clone(),
        ));

        notifier.state(SessionState::Streaming);

        let supervisor = tokio::spawn(supervise(
            mic,
            inbound,
            outbound,
            close_tx,
            shutdown_rx,
            notifier,
        ));

        self.active = Some(ActiveSession {
            shutdown,
            supervisor,
        });
        Ok(())
    }

    /// Tear the session down; safe to call in any state
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.shutdown.send_replace(true);
            let _ = active.supervisor.await;
        }
    }
}

impl Drop for DuplexSession {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.shutdown.send_replace(true);
        }
    }
}

async fn supervise(
    mut mic: Box<dyn AudioInput>,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
    close_tx: oneshot::Sender<()>,
    mut shutdown_rx: watch::Receiver<bool>,
    notifier: Notifier,
) {
    let _ = shutdown_rx.wait_for(|&stop| stop).await;
    notifier.state(SessionState::Flushing);

    // Inbound stops all sources and releases the output on its way out
    let _ = inbound.await;
    mic.stop();
    let _ = close_tx.send(());
    let _ = outbound.await;

    notifier.state(SessionState::Closed);
    tracing::info!("live session closed");
}

async fn outbound(
    mut sender: Box<dyn LiveSender>,
    mut frames: mpsc::UnboundedReceiver<Vec<f32>>,
    mut close_rx: oneshot::Receiver<()>,
    sample_rate: u32,
    shutdown: Arc<watch::Sender<bool>>,
    notifier: Notifier,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut close_rx => break,
            frame = frames.recv() => {
                let Some(samples) = frame else { break };
                let frame = DuplexFrame::from_samples(&samples, sample_rate);
                if let Err(e) = sender.send_audio(&frame).await {
                    tracing::error!(error = %e, "failed to send audio frame");
                    notifier.event(SessionEvent::Error(e.to_string()));
                    shutdown.send_replace(true);
                    break;
                }
            }
        }
    }

    if let Err(e) = sender.close().await {
        tracing::debug!(error = %e, "live channel close failed");
    }
}

async fn inbound(
    mut receiver: Box<dyn LiveReceiver>,
    mut scheduler: PlaybackScheduler,
    mut completions: mpsc::UnboundedReceiver<SourceId>,
    sample_rate: u32,
    mut shutdown_rx: watch::Receiver<bool>,
    shutdown: Arc<watch::Sender<bool>>,
    notifier: Notifier,
) {
    let mut transcript = Transcript::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.wait_for(|&stop| stop) => break,
            Some(id) = completions.recv() => scheduler.finish(id),
            event = receiver.next_event() => match event {
                Some(Ok(LiveEvent::Transcript { speaker, text })) => {
                    transcript.append(speaker, &text);
                    notifier.event(SessionEvent::Transcript(transcript.lines().to_vec()));
                }
                Some(Ok(LiveEvent::Audio { data })) => match decode_base64(&data) {
                    Ok(bytes) => {
                        let buffer = decode_pcm16(&bytes, sample_rate, 1);
                        scheduler.schedule(&buffer);
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable audio"),
                },
                Some(Ok(LiveEvent::TurnComplete)) => {
                    transcript.complete_turn();
                    notifier.event(SessionEvent::Transcript(transcript.lines().to_vec()));
                }
                Some(Ok(LiveEvent::Closed)) | None => {
                    tracing::info!("remote closed live session");
                    shutdown.send_replace(true);
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "live channel error");
                    notifier.event(SessionEvent::Error(e.to_string()));
                    shutdown.send_replace(true);
                    break;
                }
            },
        }
    }

    scheduler.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{PrebuiltVoice, VoiceProfile};

    #[test]
    fn setup_uses_base_voice_and_style() {
        let voice = VoiceSelection::Custom {
            profile: VoiceProfile::new("Guide", "calm museum guide", PrebuiltVoice::new("Aoede").unwrap()),
        };
        let setup = LiveSetup::for_voice("models/live", &voice);
        assert_eq!(setup.voice_name, "Aoede");
        assert_eq!(
            setup.system_instruction.as_deref(),
            Some("Speak in this style: calm museum guide")
        );

        let plain = LiveSetup::for_voice("models/live", &VoiceSelection::default());
        assert_eq!(plain.voice_name, "Kore");
        assert!(plain.system_instruction.is_none());
    }

    #[test]
    fn frame_carries_rate_and_pcm() {
        let frame = DuplexFrame::from_samples(&[0.5, -0.5], 16_000);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert_eq!(decode_base64(&frame.data).unwrap(), vec![0x00, 0x40, 0x00, 0xC0]);
    }
}
