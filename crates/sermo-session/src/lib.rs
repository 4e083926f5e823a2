pub mod events;
pub mod file;
pub mod relay;
pub mod session;

pub use events::EventSubscribers;
pub use file::transcribe_file;
pub use relay::AudioRelay;
pub use session::{SessionState, StreamingSession};
