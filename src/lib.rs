//! Script Narrator - long-form narration and live duplex voice
//!
//! This library provides:
//! - Script preparation (pronunciation rewriting, markup-aware chunking)
//! - Interchangeable speech providers behind one trait
//! - Production runs that assemble chunk audio into one master artifact
//! - Live duplex sessions with gapless scheduled playback
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Interfaces                        │
//! │        CLI (narrator)   │   HTTP API (axum)            │
//! └────────────┬─────────────────────────┬───────────────┘
//!              │                         │
//! ┌────────────▼─────────────┐ ┌─────────▼───────────────┐
//! │  NarrationOrchestrator   │ │     DuplexSession        │
//! │ rewrite → translate →    │ │ mic → frames → channel   │
//! │ chunk → synthesize → mux │ │ channel → scheduler      │
//! └────────────┬─────────────┘ └─────────┬───────────────┘
//!              │                         │
//! ┌────────────▼─────────────────────────▼───────────────┐
//! │  providers  │  translation  │  audio (codec, cpal)    │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod duplex;
pub mod error;
pub mod io;
pub mod narration;
pub mod providers;
pub mod text;
pub mod translation;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use narration::{MasterArtifact, NarrationOrchestrator, NarrationState, ProductionRequest};
pub use providers::{AudioFormat, ProviderKind, SpeechProvider, SynthesisResult};
pub use voice::{ModelTier, PrebuiltVoice, VoiceProfile, VoiceSelection};
