//! Audio playback to speakers
//!
//! Playback is modelled as a sink with its own clock (frames rendered so far)
//! on which buffers are started at absolute times. Overlapping starts are
//! mixed; the sink reports each buffer's completion over a channel.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::sync::mpsc;

use super::AudioBuffer;
use crate::{Error, Result};

/// Sample rate for live playback (matches streamed response audio)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Identifies a buffer started on a sink
pub type SourceId = u64;

/// Destination for scheduled audio
///
/// Implementations report finished sources on the channel they were opened
/// with.
pub trait OutputSink: Send {
    /// Output clock in seconds
    fn now(&self) -> f64;

    /// Start `buffer` at output time `at` (seconds); past times start immediately
    fn start(&mut self, id: SourceId, buffer: &AudioBuffer, at: f64);

    /// Stop a source before it finishes; unknown ids are ignored
    fn stop(&mut self, id: SourceId);

    /// Release the device; safe to call repeatedly
    fn close(&mut self);
}

struct MixSource {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

/// Mono mixer with a frame clock
pub struct Mixer {
    sample_rate: u32,
    frames_played: u64,
    sources: Vec<MixSource>,
}

impl Mixer {
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_played: 0,
            sources: Vec::new(),
        }
    }

    /// Clock position in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn now(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames_played as f64 / f64::from(self.sample_rate)
    }

    /// Queue mono samples to begin at `at` seconds
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn add(&mut self, id: SourceId, samples: Vec<f32>, at: f64) {
        let start_frame = (at.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        self.sources.push(MixSource {
            id,
            start_frame: start_frame.max(self.frames_played),
            samples,
        });
    }

    /// Drop a source; returns whether it was active
    pub fn remove(&mut self, id: SourceId) -> bool {
        let before = self.sources.len();
        self.sources.retain(|s| s.id != id);
        self.sources.len() != before
    }

    /// Number of sources not yet finished
    #[must_use]
    pub fn active(&self) -> usize {
        self.sources.len()
    }

    /// Render interleaved output, returning the ids that finished
    pub fn render(&mut self, out: &mut [f32], channels: usize) -> Vec<SourceId> {
        let channels = channels.max(1);
        let mut frames = 0u64;

        for frame in out.chunks_mut(channels) {
            let t = self.frames_played + frames;
            let mut acc = 0.0f32;
            for source in &self.sources {
                if t >= source.start_frame {
                    let offset = usize::try_from(t - source.start_frame).unwrap_or(usize::MAX);
                    if let Some(sample) = source.samples.get(offset) {
                        acc += sample;
                    }
                }
            }
            frame.fill(acc.clamp(-1.0, 1.0));
            frames += 1;
        }

        self.frames_played += frames;
        let end = self.frames_played;
        let mut finished = Vec::new();
        self.sources.retain(|s| {
            let done = s.start_frame + s.samples.len() as u64 <= end;
            if done {
                finished.push(s.id);
            }
            !done
        });
        finished
    }
}

/// Down-mix a buffer to mono samples for the mixer
fn mono_samples(buffer: &AudioBuffer) -> Vec<f32> {
    let channels = usize::from(buffer.channels.max(1));
    if channels == 1 {
        return buffer.samples.clone();
    }
    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    buffer
        .samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Plays scheduled audio on the default output device
///
/// The cpal stream lives on a dedicated thread; the mixer is shared with it.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(sample_rate: u32, completions: mpsc::UnboundedSender<SourceId>) -> Result<Self> {
        let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate)));
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let shared = Arc::clone(&mixer);
        let thread = std::thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || {
                let stream = match build_stream(sample_rate, shared, completions) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio playback closed");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                mixer,
                sample_rate,
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Audio("playback thread exited during startup".to_string())),
        }
    }

    /// Device sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn mixer(&self) -> std::sync::MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSink for CpalOutput {
    fn now(&self) -> f64 {
        self.mixer().now()
    }

    fn start(&mut self, id: SourceId, buffer: &AudioBuffer, at: f64) {
        if buffer.sample_rate != self.sample_rate {
            tracing::warn!(
                buffer_rate = buffer.sample_rate,
                device_rate = self.sample_rate,
                "buffer rate differs from output rate"
            );
        }
        let samples = mono_samples(buffer);
        self.mixer().add(id, samples, at);
    }

    fn stop(&mut self, id: SourceId) {
        self.mixer().remove(id);
    }

    fn close(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream(
    sample_rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    completions: mpsc::UnboundedSender<SourceId>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    let config: StreamConfig = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();
    let channels = usize::from(config.channels);

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio playback initialized"
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let finished = mixer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .render(data, channels);
                for id in finished {
                    let _ = completions.send(id);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

/// Play one buffer to completion
///
/// # Errors
///
/// Returns error if the output device cannot be opened
pub async fn play(buffer: &AudioBuffer) -> Result<()> {
    if buffer.samples.is_empty() {
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut output = CpalOutput::open(buffer.sample_rate, tx)?;
    output.start(0, buffer, output.now());

    // Wait for completion with timeout
    let timeout = Duration::from_secs_f64(buffer.duration()) + Duration::from_millis(500);
    if tokio::time::timeout(timeout, rx.recv()).await.is_err() {
        tracing::warn!("playback did not report completion in time");
    }

    // Small delay to ensure audio finishes
    tokio::time::sleep(Duration::from_millis(100)).await;
    output.close();
    tracing::debug!(samples = buffer.samples.len(), "playback complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_to_back_sources_render_without_gap() {
        let mut mixer = Mixer::new(4);
        mixer.add(1, vec![0.25; 4], 0.0);
        mixer.add(2, vec![0.5; 4], 1.0);

        let mut out = vec![0.0; 8];
        let finished = mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.25, 0.25, 0.25, 0.25, 0.5, 0.5, 0.5, 0.5]);
        assert_eq!(finished, vec![1, 2]);
        assert!((mixer.now() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn finished_ids_are_reported_once() {
        let mut mixer = Mixer::new(4);
        mixer.add(7, vec![0.5; 2], 0.0);

        let mut out = vec![0.0; 2];
        assert_eq!(mixer.render(&mut out, 1), vec![7]);
        assert!(mixer.render(&mut out, 1).is_empty());
        assert_eq!(mixer.active(), 0);
    }

    #[test]
    fn render_duplicates_mono_across_channels() {
        let mut mixer = Mixer::new(2);
        mixer.add(1, vec![0.5, -0.5], 0.0);

        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn past_start_times_begin_immediately() {
        let mut mixer = Mixer::new(2);
        let mut silence = vec![0.0; 4];
        mixer.render(&mut silence, 1);

        mixer.add(1, vec![0.5], 0.0);
        let mut out = vec![0.0; 1];
        mixer.render(&mut out, 1);
        assert_eq!(out, vec![0.5]);
    }

    #[test]
    fn removed_source_is_silent() {
        let mut mixer = Mixer::new(2);
        mixer.add(1, vec![0.5; 4], 0.0);
        assert!(mixer.remove(1));
        assert!(!mixer.remove(1));

        let mut out = vec![1.0; 4];
        assert!(mixer.render(&mut out, 1).is_empty());
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn stereo_buffers_are_downmixed() {
        let buffer = AudioBuffer {
            samples: vec![0.25, 0.75, 1.0, 0.0],
            sample_rate: 24_000,
            channels: 2,
        };
        assert_eq!(mono_samples(&buffer), vec![0.5, 0.5]);
    }
}
