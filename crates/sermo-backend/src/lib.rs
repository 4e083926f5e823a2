pub mod backend_trait;
pub mod null;
pub mod remote;

pub use backend_trait::{AudioSink, ResultSource, SpeechBackend};
pub use null::NullBackend;
pub use remote::RemoteBackend;
