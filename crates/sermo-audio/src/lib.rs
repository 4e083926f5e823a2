pub mod capture;
pub mod convert;
pub mod device;

pub use capture::CaptureSource;
pub use convert::{normalize, NormalizedAudio, TARGET_SAMPLE_RATE};
pub use device::DeviceManager;
