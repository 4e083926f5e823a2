use crate::backend_trait::{AudioSink, ResultSource, SpeechBackend};
use async_trait::async_trait;
use base64::Engine as _;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sermo_core::config::BackendConfig;
use sermo_core::{BackendError, RecognitionResult, ResultMessage, SessionConfig};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The production backend: audio streams over a WebSocket (one JSON config
/// frame, then binary PCM frames, then a finalize frame), while the offline
/// recognition calls go over plain HTTP.
pub struct RemoteBackend {
    stream_url: String,
    api_base: String,
    api_key: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ConfigMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    config: &'a SessionConfig,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    config: &'a SessionConfig,
    /// PCM16LE payload, base64-encoded.
    audio: String,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Deserialize)]
struct OperationStarted {
    operation: String,
}

#[derive(Deserialize)]
struct OperationStatus {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

impl RemoteBackend {
    pub fn new(stream_url: &str, api_base: &str, api_key: &str) -> Self {
        Self {
            stream_url: stream_url.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(&config.stream_url, &config.api_base, &config.api_key)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: &impl Serialize,
    ) -> Result<T, BackendError> {
        let response = self
            .authorize(self.http.post(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::Remote(format!("{status}: {detail}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    fn encode_audio(audio: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(audio)
    }
}

#[async_trait]
impl SpeechBackend for RemoteBackend {
    async fn open_stream(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn AudioSink>, Box<dyn ResultSource>), BackendError> {
        let mut request = self
            .stream_url
            .as_str()
            .into_client_request()
            .map_err(|e| BackendError::Connect(e.to_string()))?;
        if !self.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| BackendError::Connect(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;
        let (mut write, read) = ws.split();

        let handshake = serde_json::to_string(&ConfigMessage {
            kind: "config",
            config,
        })
        .map_err(|e| BackendError::Handshake(e.to_string()))?;
        write
            .send(Message::Text(handshake))
            .await
            .map_err(|e| BackendError::Handshake(e.to_string()))?;

        tracing::debug!(url = %self.stream_url, "streaming handshake sent");
        Ok((
            Box::new(WsAudioSink { write }),
            Box::new(WsResultSource { read }),
        ))
    }

    async fn recognize(
        &self,
        config: &SessionConfig,
        audio: &[u8],
    ) -> Result<Vec<RecognitionResult>, BackendError> {
        let body = RecognizeRequest {
            config,
            audio: Self::encode_audio(audio),
        };
        let response: RecognizeResponse = self
            .post_json(format!("{}/recognize", self.api_base), &body)
            .await?;
        Ok(response.results)
    }

    async fn start_long_running(
        &self,
        config: &SessionConfig,
        audio: &[u8],
    ) -> Result<String, BackendError> {
        let body = RecognizeRequest {
            config,
            audio: Self::encode_audio(audio),
        };
        let response: OperationStarted = self
            .post_json(format!("{}/recognize:longrunning", self.api_base), &body)
            .await?;
        tracing::debug!(operation = %response.operation, "long-running recognition started");
        Ok(response.operation)
    }

    async fn poll_operation(
        &self,
        operation: &str,
    ) -> Result<Option<Vec<RecognitionResult>>, BackendError> {
        let url = format!("{}/operations/{}", self.api_base, operation);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(BackendError::Remote(format!("{status}: {detail}")));
        }
        let status: OperationStatus = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        if status.done {
            Ok(Some(status.results))
        } else {
            Ok(None)
        }
    }
}

struct WsAudioSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl AudioSink for WsAudioSink {
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), BackendError> {
        self.write
            .send(Message::Binary(pcm.to_vec()))
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))
    }

    async fn finish(&mut self) -> Result<(), BackendError> {
        self.write
            .send(Message::Text(r#"{"type":"finalize"}"#.to_string()))
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        // SinkExt::close sends the Close frame; the server acknowledges by
        // ending the result stream once remaining results have gone out.
        self.write
            .close()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))
    }
}

struct WsResultSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl ResultSource for WsResultSource {
    async fn next_message(&mut self) -> Result<Option<ResultMessage>, BackendError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(msg) => return Ok(Some(msg)),
                    Err(e) => {
                        tracing::debug!("skipping unparseable frame: {}", e);
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Pings/pongs and stray binary frames carry no results.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(BackendError::Transport(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_message_wire_shape() {
        let config = SessionConfig::new(16000, "en-US");
        let json = serde_json::to_string(&ConfigMessage {
            kind: "config",
            config: &config,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "config");
        assert_eq!(value["sample_rate"], 16000);
        assert_eq!(value["language_code"], "en-US");
        assert_eq!(value["punctuation"], true);
        assert_eq!(value["interim_results"], true);
    }

    #[test]
    fn test_result_message_parses_backend_frame() {
        let frame = r#"{
            "results": [
                {"alternatives": [{"transcript": "hello", "confidence": 0.8}], "is_final": false},
                {"alternatives": [{"transcript": "hello world"}], "is_final": true}
            ]
        }"#;
        let msg: ResultMessage = serde_json::from_str(frame).unwrap();
        assert_eq!(msg.results.len(), 2);
        assert!(!msg.results[0].is_final);
        assert!(msg.results[1].is_final);
        assert_eq!(msg.results[1].best().unwrap().transcript, "hello world");
        assert_eq!(msg.results[1].best().unwrap().confidence, 0.0);
    }

    #[test]
    fn test_non_result_frame_parses_as_empty_message() {
        // Status frames without a results array deserialize to zero results,
        // which the session treats as a no-op message.
        let msg: ResultMessage = serde_json::from_str(r#"{"type":"ack"}"#).unwrap();
        assert!(msg.results.is_empty());
    }

    #[test]
    fn test_operation_status_not_done() {
        let status: OperationStatus = serde_json::from_str(r#"{"done": false}"#).unwrap();
        assert!(!status.done);
        assert!(status.results.is_empty());
    }

    #[test]
    fn test_operation_status_done_with_results() {
        let status: OperationStatus = serde_json::from_str(
            r#"{"done": true, "results": [{"alternatives": [{"transcript": "done"}], "is_final": true}]}"#,
        )
        .unwrap();
        assert!(status.done);
        assert_eq!(status.results[0].best().unwrap().transcript, "done");
    }

    #[test]
    fn test_recognize_request_encodes_audio_base64() {
        let config = SessionConfig::new(16000, "en-US");
        let body = RecognizeRequest {
            config: &config,
            audio: RemoteBackend::encode_audio(&[0u8, 1, 2, 3]),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["audio"], "AAECAw==");
        assert_eq!(value["config"]["sample_rate"], 16000);
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        let backend = RemoteBackend::new("ws://x/stream", "http://x/v1/", "");
        assert_eq!(backend.api_base, "http://x/v1");
    }
}
