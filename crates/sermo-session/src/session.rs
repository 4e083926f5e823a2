use crate::events::EventSubscribers;
use crate::relay::AudioRelay;
use sermo_core::{AudioChunk, SessionConfig, SessionError, SpeechEvent};
use sermo_backend::SpeechBackend;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Lifecycle of a streaming session.
///
/// `Failed` is terminal and reachable from any non-idle state; a session is
/// never reusable after `Closed` or `Failed` — create a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Handshaking,
    Streaming,
    Draining,
    Closed,
    Failed,
}

struct Inner {
    state: SessionState,
    sample_rate: u32,
    relay: Option<Arc<AudioRelay>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

/// One live bidirectional recognition stream.
///
/// Owns the connection for exactly one "listening" period: `start` performs
/// the handshake and launches the writer and reader activities, `send_audio`
/// feeds the relay, `stop` drains and tears down. The two activities share
/// nothing mutable besides the relay and the connection halves, so the hot
/// audio path carries no locks.
pub struct StreamingSession {
    backend: Arc<dyn SpeechBackend>,
    subscribers: Arc<EventSubscribers>,
    inner: Mutex<Inner>,
}

impl StreamingSession {
    pub fn new(backend: Arc<dyn SpeechBackend>) -> Self {
        Self {
            backend,
            subscribers: Arc::new(EventSubscribers::new()),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                sample_rate: 0,
                relay: None,
                writer: None,
                reader: None,
            }),
        }
    }

    /// Register a subscriber for partial/final recognition events. Callbacks
    /// fire synchronously on the reader activity, in backend-arrival order.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&SpeechEvent) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback);
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    /// Open the backend stream, send the one-time configuration handshake
    /// and launch the writer and reader activities.
    ///
    /// A handshake or connection failure surfaces here as
    /// [`SessionError::Start`] and leaves the session in `Failed`.
    pub async fn start(&self, config: SessionConfig) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                SessionState::Idle => inner.state = SessionState::Handshaking,
                SessionState::Closed | SessionState::Failed => {
                    return Err(SessionError::NotReusable)
                }
                _ => return Err(SessionError::AlreadyActive),
            }
            inner.sample_rate = config.sample_rate;
        }

        let (sink, source) = match self.backend.open_stream(&config).await {
            Ok(pair) => pair,
            Err(e) => {
                self.inner.lock().unwrap().state = SessionState::Failed;
                return Err(SessionError::Start(e));
            }
        };

        let (relay, mut relay_rx) = AudioRelay::new();

        let writer = tokio::spawn(async move {
            let mut sink = sink;
            while let Some(chunk) = relay_rx.recv().await {
                if let Err(e) = sink.send_audio(&chunk.bytes).await {
                    // A broken write half ends this activity; the failure
                    // never crosses the component boundary.
                    tracing::warn!("audio writer stopping: {}", e);
                    return;
                }
            }
            // Relay closed and fully drained — tell the backend no more
            // audio is coming while results may still be in flight.
            if let Err(e) = sink.finish().await {
                tracing::debug!("half-close failed: {}", e);
            }
        });

        let subscribers = Arc::clone(&self.subscribers);
        let reader = tokio::spawn(async move {
            let mut source = source;
            loop {
                match source.next_message().await {
                    Ok(Some(message)) => {
                        for result in message.results {
                            let Some(best) = result.best() else { continue };
                            let event = if result.is_final {
                                SpeechEvent::Final(best.transcript.clone())
                            } else {
                                SpeechEvent::Partial(best.transcript.clone())
                            };
                            subscribers.publish(&event);
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("result stream ended");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("result stream error, reader stopping: {}", e);
                        break;
                    }
                }
            }
        });

        let mut inner = self.inner.lock().unwrap();
        inner.relay = Some(Arc::new(relay));
        inner.writer = Some(writer);
        inner.reader = Some(reader);
        inner.state = SessionState::Streaming;
        tracing::info!(
            sample_rate = config.sample_rate,
            language = %config.language_code,
            "streaming session started"
        );
        Ok(())
    }

    /// Queue a copied chunk for the writer activity.
    ///
    /// A silent no-op in every state but `Streaming`: before the handshake
    /// the relay does not exist yet, and after `stop` no chunk may follow
    /// the half-close.
    pub fn send_audio(&self, pcm: &[u8]) {
        let inner = self.inner.lock().unwrap();
        if inner.state != SessionState::Streaming {
            tracing::trace!(state = ?inner.state, "send_audio ignored outside Streaming");
            return;
        }
        if let Some(relay) = &inner.relay {
            relay.push(AudioChunk {
                bytes: pcm.to_vec(),
                sample_rate: inner.sample_rate,
            });
        }
    }

    /// Drain and tear down: close the relay for input (queued chunks still
    /// flush), half-close the connection, then await the backend's
    /// end-of-stream. Idempotent; calls after `Closed` are no-ops.
    pub async fn stop(&self) {
        let (writer, reader) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != SessionState::Streaming {
                tracing::debug!(state = ?inner.state, "stop ignored");
                return;
            }
            inner.state = SessionState::Draining;
            if let Some(relay) = &inner.relay {
                relay.close();
            }
            (inner.writer.take(), inner.reader.take())
        };

        // Cooperative: the writer exits once drained, the reader once the
        // backend signals end-of-stream. No per-chunk timeout exists; a
        // stalled backend only makes stop take as long as the backend takes.
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        if let Some(reader) = reader {
            let _ = reader.await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.relay = None;
        inner.state = SessionState::Closed;
        tracing::info!("streaming session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sermo_backend::NullBackend;
    use sermo_core::{RecognitionResult, ResultMessage, TranscriptAlternative};

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
    async fn test_session_starts_idle() {
        let session = StreamingSession::new(Arc::new(NullBackend::new()));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let session = StreamingSession::new(Arc::new(NullBackend::new()));
        session
            .start(SessionConfig::new(16000, "en-US"))
            .await
            .unwrap();
        match session.start(SessionConfig::new(16000, "en-US")).await {
            Err(SessionError::AlreadyActive) => {}
            other => panic!("expected AlreadyActive, got {:?}", other),
        }
        session.stop().await;
    }

    #[tokio::test]
    async fn test_start_after_stop_is_not_reusable() {
        let session = StreamingSession::new(Arc::new(NullBackend::new()));
        session
            .start(SessionConfig::new(16000, "en-US"))
            .await
            .unwrap();
        session.stop().await;
        match session.start(SessionConfig::new(16000, "en-US")).await {
            Err(SessionError::NotReusable) => {}
            other => panic!("expected NotReusable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_audio_before_start_is_silent_noop() {
        let session = StreamingSession::new(Arc::new(NullBackend::new()));
        session.send_audio(&[1, 2, 3]);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let session = StreamingSession::new(Arc::new(NullBackend::new()));
        session.stop().await;
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_events_preserve_arrival_order() {
        let backend = Arc::new(NullBackend::new().with_results(vec![
            message("one", false),
            message("one two", false),
            message("one two three", true),
        ]));
        let session = StreamingSession::new(backend);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        session
            .start(SessionConfig::new(16000, "en-US"))
            .await
            .unwrap();
        session.stop().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], SpeechEvent::Partial("one".to_string()));
        assert_eq!(seen[1], SpeechEvent::Partial("one two".to_string()));
        assert_eq!(seen[2], SpeechEvent::Final("one two three".to_string()));
    }

    #[tokio::test]
    async fn test_transport_error_is_absorbed() {
        let backend = Arc::new(
            NullBackend::new()
                .with_results(vec![message("partial", false), message("lost", true)])
                .fail_stream_after(1),
        );
        let session = StreamingSession::new(Arc::clone(&backend) as Arc<dyn SpeechBackend>);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        session
            .start(SessionConfig::new(16000, "en-US"))
            .await
            .unwrap();
        // The reader dies silently; sending and stopping still work.
        session.send_audio(&[0u8; 3200]);
        session.stop().await;

        assert_eq!(session.state(), SessionState::Closed);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "only the event before the failure arrives");
    }
}
