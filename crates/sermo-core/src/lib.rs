pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{
    AudioError, BackendError, ConfigError, FormatError, SessionError, TranscribeError,
};
pub use types::{
    AudioChunk, RecognitionResult, ResultMessage, SessionConfig, SpeechEvent,
    TranscriptAlternative, TranscriptionOptions,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_chunk_creation() {
        let chunk = AudioChunk {
            bytes: vec![0, 1, 2, 3],
            sample_rate: 16000,
        };
        assert_eq!(chunk.bytes.len(), 4);
        assert_eq!(chunk.sample_rate, 16000);
    }

    #[test]
    fn test_result_message_roundtrip_fields() {
        let msg = ResultMessage {
            results: vec![RecognitionResult {
                alternatives: vec![TranscriptAlternative {
                    transcript: "hello".to_string(),
                    confidence: 0.9,
                }],
                is_final: false,
            }],
        };
        assert_eq!(msg.results.len(), 1);
        assert_eq!(msg.results[0].best().unwrap().transcript, "hello");
        assert!(!msg.results[0].is_final);
    }
}
