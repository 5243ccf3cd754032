//! Running transcript of a live session

use serde::Serialize;

/// Who spoke a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
    /// Set once the turn it belongs to completed
    pub is_final: bool,
}

/// Transcript lines plus the pending fragment buffer of each speaker
///
/// Fragments of an ongoing turn accumulate and keep replacing that speaker's
/// last non-final line, so the line grows in place.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
    user_buffer: String,
    model_buffer: String,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transcription fragment for `speaker`
    pub fn append(&mut self, speaker: Speaker, fragment: &str) {
        let buffer = match speaker {
            Speaker::User => &mut self.user_buffer,
            Speaker::Model => &mut self.model_buffer,
        };
        buffer.push_str(fragment);
        let text = buffer.clone();

        match self
            .lines
            .iter_mut()
            .rev()
            .find(|l| l.speaker == speaker && !l.is_final)
        {
            Some(line) => line.text = text,
            None => self.lines.push(TranscriptLine {
                speaker,
                text,
                is_final: false,
            }),
        }
    }

    /// Finalize every line and clear both buffers
    pub fn complete_turn(&mut self) {
        for line in &mut self.lines {
            line.is_final = true;
        }
        self.user_buffer.clear();
        self.model_buffer.clear();
    }

    #[must_use]
    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }
}
