//! Binary audio transcoding and assembly
//!
//! Everything here is a pure function over bytes or samples. PCM payloads are
//! 16-bit little-endian and carry no header, so producer and consumer agree on
//! sample rate and channel count out of band.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Size of the canonical RIFF/WAVE header written by [`mux_wav`]
pub const WAV_HEADER_LEN: usize = 44;

/// Decoded, playable audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Encode bytes as standard base64 without line wrapping
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64
///
/// # Errors
///
/// Returns error if the input is not valid base64
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| Error::Audio(format!("invalid base64 audio: {e}")))
}

/// Convert a float sample in `[-1.0, 1.0]` to 16-bit PCM
///
/// Scales by 32768 and saturates, so `1.0` maps to `i16::MAX`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pcm_float_to_int16(sample: f32) -> i16 {
    // `as` saturates on overflow and maps NaN to 0
    (sample * 32768.0) as i16
}

/// Convert float samples to little-endian PCM16 bytes
#[must_use]
pub fn samples_to_pcm16_le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| pcm_float_to_int16(s).to_le_bytes())
        .collect()
}

/// Concatenate byte buffers in order without re-encoding
#[must_use]
pub fn concatenate<B: AsRef<[u8]>>(buffers: &[B]) -> Vec<u8> {
    let total = buffers.iter().map(|b| b.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for buffer in buffers {
        out.extend_from_slice(buffer.as_ref());
    }
    out
}

/// Wrap raw PCM16 in a canonical 44-byte WAV container
///
/// Header sizes are computed from the actual payload length, so odd or
/// unexpected lengths still yield a structurally valid file. Payloads larger
/// than the RIFF format can describe saturate the size fields.
#[must_use]
pub fn mux_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let block_align = channels.saturating_mul(2);
    let byte_rate = sample_rate.saturating_mul(u32::from(block_align));
    let data_len = u32::try_from(pcm.len()).unwrap_or(u32::MAX);
    let riff_len = data_len.saturating_add(36);

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // linear PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);

    out
}

/// Interpret raw bytes as little-endian PCM16 at the declared format
///
/// A trailing odd byte cannot form a sample and is ignored.
#[must_use]
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> AudioBuffer {
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    AudioBuffer {
        samples,
        sample_rate,
        channels,
    }
}

/// Decode MPEG audio to a mono buffer
///
/// # Errors
///
/// Returns error if a frame cannot be decoded
pub fn decode_mp3(mp3_data: &[u8]) -> Result<AudioBuffer> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
        channels: 1,
    })
}

/// Read a 16-bit PCM WAV file into a buffer
///
/// # Errors
///
/// Returns error if the data is not a 16-bit integer WAV
pub fn decode_wav(wav_data: &[u8]) -> Result<AudioBuffer> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav_data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(Error::Audio(format!(
            "unsupported WAV format: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .samples::<i16>()
        .map(|s| s.map(|v| f32::from(v) / 32768.0))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(AudioBuffer {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}
