//! Audio device seam for live sessions

use tokio::sync::mpsc;

use crate::Result;
use crate::audio::{CpalOutput, MicrophoneCapture, OutputSink, SourceId};

/// A running microphone
pub trait AudioInput: Send {
    /// Stop delivering frames; safe to call repeatedly
    fn stop(&mut self);
}

/// Opens the microphone and speaker used by a session
pub trait AudioDevices: Send + Sync {
    /// Start capturing mono frames of `frame_samples` at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns `MicrophoneAccessDenied` if the microphone cannot be opened
    fn open_input(
        &self,
        sample_rate: u32,
        frame_samples: usize,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn AudioInput>>;

    /// Open an output whose finished sources are reported on `completions`
    ///
    /// # Errors
    ///
    /// Returns error if no output device is usable
    fn open_output(
        &self,
        sample_rate: u32,
        completions: mpsc::UnboundedSender<SourceId>,
    ) -> Result<Box<dyn OutputSink>>;
}

/// Default system devices through cpal
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAudio;

impl AudioInput for MicrophoneCapture {
    fn stop(&mut self) {
        Self::stop(self);
    }
}

impl AudioDevices for SystemAudio {
    fn open_input(
        &self,
        sample_rate: u32,
        frame_samples: usize,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn AudioInput>> {
        Ok(Box::new(MicrophoneCapture::open(sample_rate, frame_samples, frames)?))
    }

    fn open_output(
        &self,
        sample_rate: u32,
        completions: mpsc::UnboundedSender<SourceId>,
    ) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(CpalOutput::open(sample_rate, completions)?))
    }
}
