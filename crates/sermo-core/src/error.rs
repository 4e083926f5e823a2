use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    #[error("failed to build capture stream: {0}")]
    StreamBuild(String),
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    #[error("failed to read audio source: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to connect to recognition backend: {0}")]
    Connect(String),

    #[error("streaming handshake failed: {0}")]
    Handshake(String),

    #[error("transport failure on recognition stream: {0}")]
    Transport(String),

    #[error("recognition backend rejected the request: {0}")]
    Remote(String),

    #[error("long-running operation did not complete: {0}")]
    OperationTimeout(String),

    #[error("malformed backend response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start streaming session: {0}")]
    Start(#[from] BackendError),

    #[error("a streaming session is already active")]
    AlreadyActive,

    #[error("session already stopped; create a fresh session to stream again")]
    NotReusable,
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
