//! Audio capture from microphone
//!
//! Captured samples are down-mixed to mono, resampled to the requested rate
//! when the device cannot open it natively, and delivered as fixed-size
//! frames over a channel in capture order.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use rubato::{FftFixedIn, Resampler};
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Sample rate for live capture (16kHz for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Samples per outbound frame
pub const DEFAULT_FRAME_SAMPLES: usize = 4096;

/// Input chunk size fed to the resampler
const RESAMPLER_CHUNK: usize = 1024;

/// Splits a sample stream into frames of exactly `frame_samples`
#[derive(Debug)]
pub struct Framer {
    frame_samples: usize,
    pending: Vec<f32>,
}

impl Framer {
    #[must_use]
    pub fn new(frame_samples: usize) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        }
    }

    /// Append samples, returning every completed frame
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Samples waiting for a full frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Streaming mono resampler between two fixed rates
pub struct StreamResampler {
    inner: FftFixedIn<f32>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a resampler from `from_rate` to `to_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the rates are unsupported
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let inner = FftFixedIn::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            RESAMPLER_CHUNK,
            2,
            1,
        )
        .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Feed samples, returning whatever output is ready
    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let rest = self.pending.split_off(needed);
            let chunk = std::mem::replace(&mut self.pending, rest);
            match self.inner.process(&[chunk], None) {
                Ok(mut channels) => out.append(&mut channels[0]),
                Err(e) => {
                    tracing::warn!(error = %e, "resampler dropped a chunk");
                }
            }
        }
        out
    }
}

/// Down-mix interleaved samples to mono
fn to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Captures audio from the default input device
///
/// The cpal stream lives on a dedicated thread; this handle only signals it,
/// so it can be moved between tasks.
pub struct MicrophoneCapture {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl MicrophoneCapture {
    /// Open the default microphone and start sending frames
    ///
    /// # Errors
    ///
    /// Returns `MicrophoneAccessDenied` if no usable input device can be opened
    pub fn open(
        sample_rate: u32,
        frame_samples: usize,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Self> {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(sample_rate, frame_samples, frames) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Park until stopped or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
                sample_rate,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::MicrophoneAccessDenied(
                "capture thread exited during startup".to_string(),
            )),
        }
    }

    /// Stop capturing; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Rate of the delivered frames
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream(
    sample_rate: u32,
    frame_samples: usize,
    frames: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::MicrophoneAccessDenied("no input device available".to_string()))?;

    let native = device
        .supported_input_configs()
        .map_err(|e| Error::MicrophoneAccessDenied(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        });

    let config: StreamConfig = match native {
        Some(supported) => supported.with_sample_rate(SampleRate(sample_rate)).config(),
        None => device
            .default_input_config()
            .map_err(|e| Error::MicrophoneAccessDenied(e.to_string()))?
            .config(),
    };

    let device_rate = config.sample_rate.0;
    let channels = usize::from(config.channels);
    let mut resampler = if device_rate == sample_rate {
        None
    } else {
        Some(StreamResampler::new(device_rate, sample_rate)?)
    };
    let mut framer = Framer::new(frame_samples);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        device_rate,
        sample_rate,
        channels,
        resampling = resampler.is_some(),
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = to_mono(data, channels);
                let samples = match resampler.as_mut() {
                    Some(r) => r.push(&mono),
                    None => mono,
                };
                for frame in framer.push(&samples) {
                    // Receiver gone means the session is shutting down
                    if frames.send(frame).is_err() {
                        return;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::MicrophoneAccessDenied(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::MicrophoneAccessDenied(e.to_string()))?;
    tracing::debug!("audio capture started");

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framer_emits_fixed_size_frames_in_order() {
        let mut framer = Framer::new(4);
        assert!(framer.push(&[0.1, 0.2, 0.3]).is_empty());
        assert_eq!(framer.pending(), 3);

        let frames = framer.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(frames, vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.5, 0.6, 0.7, 0.8]]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn mono_downmix_averages_channels() {
        assert_eq!(to_mono(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
        assert_eq!(to_mono(&[0.5, 0.25], 1), vec![0.5, 0.25]);
    }

    #[test]
    fn resampler_halves_sample_count() {
        let mut resampler = StreamResampler::new(32_000, 16_000).unwrap();
        let input = vec![0.0f32; 32_000];
        let out = resampler.push(&input);
        // Allow for samples still buffered inside the resampler
        assert!(out.len() > 15_000 && out.len() <= 16_000, "got {}", out.len());
    }
}
