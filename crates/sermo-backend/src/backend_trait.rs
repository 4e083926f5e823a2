use async_trait::async_trait;
use sermo_core::{BackendError, RecognitionResult, ResultMessage, SessionConfig};

/// A remote recognition backend.
///
/// The backend is specified at the message level only: a streaming session
/// sends one config message, any number of audio-data messages and a
/// half-close; the server sends any number of result messages and then
/// end-of-stream. The wire encoding behind these messages is an
/// implementation detail of the backend.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Open a bidirectional stream and send the one-time configuration
    /// handshake. Returning successfully means the handshake went out, so
    /// the exactly-once, audio-comes-after invariant holds by construction;
    /// a handshake failure surfaces here, synchronously.
    async fn open_stream(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn AudioSink>, Box<dyn ResultSource>), BackendError>;

    /// Single-shot recognition of a complete audio buffer.
    async fn recognize(
        &self,
        config: &SessionConfig,
        audio: &[u8],
    ) -> Result<Vec<RecognitionResult>, BackendError>;

    /// Kick off a long-running recognition, returning an operation id to
    /// poll with [`poll_operation`](Self::poll_operation).
    async fn start_long_running(
        &self,
        config: &SessionConfig,
        audio: &[u8],
    ) -> Result<String, BackendError>;

    /// Poll a long-running operation. `Ok(None)` means not done yet.
    async fn poll_operation(
        &self,
        operation: &str,
    ) -> Result<Option<Vec<RecognitionResult>>, BackendError>;
}

/// Write half of a streaming connection. Exactly one writer owns it.
#[async_trait]
pub trait AudioSink: Send {
    /// Forward one audio-data message. Chunks must arrive in capture order;
    /// the sink itself performs no buffering or reordering.
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), BackendError>;

    /// Half-close: signal that no more audio will ever be sent, while
    /// results may still be in flight on the read half.
    async fn finish(&mut self) -> Result<(), BackendError>;
}

/// Read half of a streaming connection. Exactly one reader owns it.
#[async_trait]
pub trait ResultSource: Send {
    /// Receive the next result message. `Ok(None)` is a clean end-of-stream;
    /// an `Err` is a transport failure the session absorbs locally.
    async fn next_message(&mut self) -> Result<Option<ResultMessage>, BackendError>;
}
