//! Live channel over the primary engine's bidirectional WebSocket

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{DuplexFrame, LiveConnector, LiveEvent, LiveReceiver, LiveSender, LiveSetup, Speaker};
use crate::config::Config;
use crate::providers::SpeechConfig;
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects live sessions to the primary engine
pub struct GeminiLiveConnector {
    url: String,
    api_key: SecretString,
}

impl GeminiLiveConnector {
    #[must_use]
    pub const fn new(url: String, api_key: SecretString) -> Self {
        Self { url, api_key }
    }

    /// # Errors
    ///
    /// Returns `Config` error if no primary engine key is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config
            .api_keys
            .gemini
            .as_ref()
            .ok_or_else(|| Error::Config("Gemini API key required for live sessions".to_string()))?;
        Ok(Self::new(
            config.live.url.clone(),
            SecretString::from(key.expose_secret().to_string()),
        ))
    }
}

#[derive(Serialize)]
struct SetupMessage<'a> {
    setup: Setup<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: &'a str,
    generation_config: LiveGenerationConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    input_audio_transcription: Empty,
    output_audio_transcription: Empty,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveGenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput<'a> {
    realtime_input: MediaChunks<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunks<'a> {
    media_chunks: [&'a DuplexFrame; 1],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct Transcription {
    text: Option<String>,
}

fn setup_message(setup: &LiveSetup) -> Result<String> {
    let message = SetupMessage {
        setup: Setup {
            model: &setup.model,
            generation_config: LiveGenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig::prebuilt(&setup.voice_name),
            },
            system_instruction: setup.system_instruction.as_deref().map(|text| SystemInstruction {
                parts: [TextPart { text }],
            }),
            input_audio_transcription: Empty {},
            output_audio_transcription: Empty {},
        },
    };
    Ok(serde_json::to_string(&message)?)
}

fn parse_message(message: &Message) -> Result<Option<ServerMessage>> {
    let parsed = match message {
        Message::Text(text) => serde_json::from_str(text)?,
        Message::Binary(bytes) => serde_json::from_slice(bytes)?,
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

/// Events carried by one server message, in the order they should apply
fn events_of(message: ServerMessage) -> Vec<LiveEvent> {
    let mut events = Vec::new();
    if message.go_away.is_some() {
        tracing::warn!("live server is about to disconnect");
    }
    let Some(content) = message.server_content else {
        return events;
    };

    let transcripts = [
        (Speaker::User, content.input_transcription),
        (Speaker::Model, content.output_transcription),
    ];
    for (speaker, transcription) in transcripts {
        if let Some(text) = transcription.and_then(|t| t.text).filter(|t| !t.is_empty()) {
            events.push(LiveEvent::Transcript { speaker, text });
        }
    }

    if let Some(turn) = content.model_turn {
        events.extend(
            turn.parts
                .into_iter()
                .filter_map(|p| p.inline_data)
                .map(|d| LiveEvent::Audio { data: d.data }),
        );
    }

    if content.turn_complete {
        events.push(LiveEvent::TurnComplete);
    }
    events
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(
        &self,
        setup: &LiveSetup,
    ) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)> {
        let url = format!("{}?key={}", self.url, self.api_key.expose_secret());
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| Error::Channel(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        sink.send(Message::Text(setup_message(setup)?))
            .await
            .map_err(|e| Error::Channel(e.to_string()))?;

        // Nothing may be streamed until the server acknowledges the setup
        loop {
            let message = stream
                .next()
                .await
                .ok_or_else(|| Error::Channel("closed during setup".to_string()))?
                .map_err(|e| Error::Channel(e.to_string()))?;

            if let Message::Close(frame) = &message {
                let reason = frame.as_ref().map(|f| f.reason.to_string()).unwrap_or_default();
                return Err(Error::Channel(format!("setup rejected: {reason}")));
            }
            if parse_message(&message)?.is_some_and(|m| m.setup_complete.is_some()) {
                break;
            }
        }

        tracing::debug!(model = %setup.model, "live setup complete");
        Ok((
            Box::new(GeminiLiveSender { sink }),
            Box::new(GeminiLiveReceiver {
                stream,
                pending: VecDeque::new(),
            }),
        ))
    }
}

struct GeminiLiveSender {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl LiveSender for GeminiLiveSender {
    async fn send_audio(&mut self, frame: &DuplexFrame) -> Result<()> {
        let message = serde_json::to_string(&RealtimeInput {
            realtime_input: MediaChunks {
                media_chunks: [frame],
            },
        })?;
        self.sink
            .send(Message::Text(message))
            .await
            .map_err(|e| Error::Channel(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| Error::Channel(e.to_string()))
    }
}

struct GeminiLiveReceiver {
    stream: SplitStream<WsStream>,
    pending: VecDeque<LiveEvent>,
}

#[async_trait]
impl LiveReceiver for GeminiLiveReceiver {
    async fn next_event(&mut self) -> Option<Result<LiveEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }

            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(Error::Channel(e.to_string()))),
            };

            if matches!(message, Message::Close(_)) {
                return Some(Ok(LiveEvent::Closed));
            }

            match parse_message(&message) {
                Ok(Some(parsed)) => self.pending.extend(events_of(parsed)),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "ignoring unparsable live message"),
            }
        }
    }
}
