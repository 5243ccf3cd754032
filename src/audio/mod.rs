//! Audio processing module
//!
//! Handles PCM/WAV/base64 transcoding, microphone capture and scheduled
//! playback.

mod capture;
pub mod codec;
mod playback;

pub use capture::{CAPTURE_SAMPLE_RATE, DEFAULT_FRAME_SAMPLES, Framer, MicrophoneCapture, StreamResampler};
pub use codec::{
    AudioBuffer, WAV_HEADER_LEN, concatenate, decode_base64, decode_mp3, decode_pcm16, decode_wav,
    encode_base64, mux_wav, pcm_float_to_int16, samples_to_pcm16_le,
};
pub use playback::{CpalOutput, Mixer, OutputSink, PLAYBACK_SAMPLE_RATE, SourceId, play};
