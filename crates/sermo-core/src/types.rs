use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One slice of PCM16LE mono audio, freshly owned.
///
/// Capture backends reuse their device buffers, so a chunk is always a copy
/// made inside the capture callback before it crosses any channel.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Duration of this chunk, assuming 16-bit mono samples.
    pub fn duration(&self) -> Duration {
        let samples = self.bytes.len() / 2;
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}

/// Immutable per-session configuration, serialized as the one-time
/// handshake message sent before any audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub language_code: String,
    pub punctuation: bool,
    pub interim_results: bool,
}

impl SessionConfig {
    pub fn new(sample_rate: u32, language_code: &str) -> Self {
        Self {
            sample_rate,
            language_code: language_code.to_string(),
            punctuation: true,
            interim_results: true,
        }
    }
}

/// A single transcript hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptAlternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

/// One recognition result inside a backend message.
///
/// A non-final result may be superseded by later results for the same
/// utterance; a final result is never revised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub alternatives: Vec<TranscriptAlternative>,
    #[serde(default)]
    pub is_final: bool,
}

impl RecognitionResult {
    /// Best-ranked alternative, if the backend produced any.
    pub fn best(&self) -> Option<&TranscriptAlternative> {
        self.alternatives.first()
    }
}

/// One message received off the result stream. May carry zero results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub results: Vec<RecognitionResult>,
}

/// Event published to session subscribers, in backend-arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Partial(String),
    Final(String),
}

impl SpeechEvent {
    pub fn text(&self) -> &str {
        match self {
            SpeechEvent::Partial(t) | SpeechEvent::Final(t) => t,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, SpeechEvent::Final(_))
    }
}

/// Policy knobs for the offline file-transcription path.
#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    pub language_code: String,
    /// Files at or under this duration go through the single-shot
    /// recognition call; longer files go through the long-running path.
    pub sync_threshold: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
}

impl Default for TranscriptionOptions {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            sync_threshold: Duration::from_secs(60),
            poll_interval: Duration::from_millis(1500),
            poll_max_attempts: 240,
        }
    }
}
