use crate::backend_trait::{AudioSink, ResultSource, SpeechBackend};
use async_trait::async_trait;
use sermo_core::{BackendError, RecognitionResult, ResultMessage, SessionConfig};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// In-process backend serving scripted results. Used by tests and dry runs
/// where no remote service is reachable.
///
/// Scripted messages are delivered while the stream is open; end-of-stream
/// is reached only after the sink's half-close, mirroring a well-behaved
/// remote backend.
pub struct NullBackend {
    scripted: Vec<ResultMessage>,
    fail_stream_after: Option<usize>,
    polls_until_done: u32,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    polls: AtomicU32,
    recognize_calls: AtomicUsize,
    long_running_calls: AtomicUsize,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            scripted: Vec::new(),
            fail_stream_after: None,
            polls_until_done: 3,
            sent: Arc::new(Mutex::new(Vec::new())),
            polls: AtomicU32::new(0),
            recognize_calls: AtomicUsize::new(0),
            long_running_calls: AtomicUsize::new(0),
        }
    }

    /// Result messages every stream (and recognition call) will serve.
    pub fn with_results(mut self, results: Vec<ResultMessage>) -> Self {
        self.scripted = results;
        self
    }

    /// Turn scripted message `index` into a transport error.
    pub fn fail_stream_after(mut self, index: usize) -> Self {
        self.fail_stream_after = Some(index);
        self
    }

    /// How many polls a long-running operation needs before completing.
    pub fn polls_until_done(mut self, polls: u32) -> Self {
        self.polls_until_done = polls;
        self
    }

    /// Every audio payload received on any stream, in arrival order.
    pub fn sent_audio(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recognize_calls(&self) -> usize {
        self.recognize_calls.load(Ordering::Relaxed)
    }

    pub fn long_running_calls(&self) -> usize {
        self.long_running_calls.load(Ordering::Relaxed)
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::Relaxed)
    }

    fn flattened_results(&self) -> Vec<RecognitionResult> {
        self.scripted
            .iter()
            .flat_map(|m| m.results.clone())
            .collect()
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechBackend for NullBackend {
    async fn open_stream(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn AudioSink>, Box<dyn ResultSource>), BackendError> {
        tracing::trace!(
            sample_rate = config.sample_rate,
            language = %config.language_code,
            "null backend stream opened"
        );
        let (tx, rx) = mpsc::unbounded_channel();

        for (index, message) in self.scripted.iter().enumerate() {
            if self.fail_stream_after == Some(index) {
                let _ = tx.send(Err(BackendError::Transport(
                    "scripted transport failure".to_string(),
                )));
                break;
            }
            let _ = tx.send(Ok(message.clone()));
        }

        Ok((
            Box::new(NullSink {
                sent: Arc::clone(&self.sent),
                open_tx: Some(tx),
            }),
            Box::new(NullSource { rx }),
        ))
    }

    async fn recognize(
        &self,
        _config: &SessionConfig,
        audio: &[u8],
    ) -> Result<Vec<RecognitionResult>, BackendError> {
        self.recognize_calls.fetch_add(1, Ordering::Relaxed);
        self.sent.lock().unwrap().push(audio.to_vec());
        Ok(self.flattened_results())
    }

    async fn start_long_running(
        &self,
        _config: &SessionConfig,
        audio: &[u8],
    ) -> Result<String, BackendError> {
        self.long_running_calls.fetch_add(1, Ordering::Relaxed);
        self.sent.lock().unwrap().push(audio.to_vec());
        Ok("null-operation-1".to_string())
    }

    async fn poll_operation(
        &self,
        _operation: &str,
    ) -> Result<Option<Vec<RecognitionResult>>, BackendError> {
        let polls = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if polls >= self.polls_until_done {
            Ok(Some(self.flattened_results()))
        } else {
            Ok(None)
        }
    }
}

struct NullSink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Keeps the result channel open until half-close.
    open_tx: Option<mpsc::UnboundedSender<Result<ResultMessage, BackendError>>>,
}

#[async_trait]
impl AudioSink for NullSink {
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), BackendError> {
        if self.open_tx.is_none() {
            return Err(BackendError::Transport(
                "audio after half-close".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(pcm.to_vec());
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), BackendError> {
        // Dropping the sender lets the source drain buffered messages and
        // then observe end-of-stream.
        self.open_tx.take();
        Ok(())
    }
}

struct NullSource {
    rx: mpsc::UnboundedReceiver<Result<ResultMessage, BackendError>>,
}

#[async_trait]
impl ResultSource for NullSource {
    async fn next_message(&mut self) -> Result<Option<ResultMessage>, BackendError> {
        match self.rx.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sermo_core::TranscriptAlternative;

    fn message(text: &str, is_final: bool) -> ResultMessage {
        ResultMessage {
            results: vec![RecognitionResult {
                alternatives: vec![TranscriptAlternative {
                    transcript: text.to_string(),
                    confidence: 1.0,
                }],
                is_final,
            }],
        }
    }

    #[tokio::test]
    async fn test_stream_serves_scripted_then_eos_after_finish() {
        let backend = NullBackend::new().with_results(vec![
            message("hel", false),
            message("hello", true),
        ]);
        let config = SessionConfig::new(16000, "en-US");
        let (mut sink, mut source) = backend.open_stream(&config).await.unwrap();

        sink.send_audio(&[1, 2, 3]).await.unwrap();

        let first = source.next_message().await.unwrap().unwrap();
        assert!(!first.results[0].is_final);
        let second = source.next_message().await.unwrap().unwrap();
        assert!(second.results[0].is_final);

        sink.finish().await.unwrap();
        assert!(source.next_message().await.unwrap().is_none());
        assert_eq!(backend.sent_audio(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_stream_scripted_transport_failure() {
        let backend = NullBackend::new()
            .with_results(vec![message("ok", false), message("never", true)])
            .fail_stream_after(1);
        let config = SessionConfig::new(16000, "en-US");
        let (_sink, mut source) = backend.open_stream(&config).await.unwrap();

        assert!(source.next_message().await.unwrap().is_some());
        match source.next_message().await {
            Err(BackendError::Transport(_)) => {}
            other => panic!("expected Transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_rejects_audio_after_finish() {
        let backend = NullBackend::new();
        let config = SessionConfig::new(16000, "en-US");
        let (mut sink, _source) = backend.open_stream(&config).await.unwrap();
        sink.finish().await.unwrap();
        assert!(sink.send_audio(&[0]).await.is_err());
    }

    #[tokio::test]
    async fn test_recognize_returns_flattened_results() {
        let backend = NullBackend::new().with_results(vec![
            message("first line", true),
            message("second line", true),
        ]);
        let config = SessionConfig::new(16000, "en-US");
        let results = backend.recognize(&config, &[0u8; 8]).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(backend.recognize_calls(), 1);
    }

    #[tokio::test]
    async fn test_long_running_completes_after_polls() {
        let backend = NullBackend::new()
            .with_results(vec![message("slow answer", true)])
            .polls_until_done(3);
        let config = SessionConfig::new(16000, "en-US");

        let op = backend.start_long_running(&config, &[0u8; 8]).await.unwrap();
        assert!(backend.poll_operation(&op).await.unwrap().is_none());
        assert!(backend.poll_operation(&op).await.unwrap().is_none());
        let results = backend.poll_operation(&op).await.unwrap().unwrap();
        assert_eq!(results[0].best().unwrap().transcript, "slow answer");
        assert_eq!(backend.poll_count(), 3);
    }
}
