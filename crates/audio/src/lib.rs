pub mod capture;
pub mod chunker;
pub mod rolling_buffer;

pub use capture::{list_input_devices, AudioCaptureThread, AudioFrame, FrameQueue};
pub use chunker::FixedWindowSegmenter;
pub use rolling_buffer::RollingBuffer;
