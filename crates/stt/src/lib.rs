pub mod mock;
pub mod subprocess;

pub use mock::MockTranscriber;
pub use subprocess::SubprocessBackend;

use async_trait::async_trait;
use voxstream_foundation::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscribeMode {
    Final,
    Interim,
}

/// Uniform decode interface over the in-process and subprocess backends.
/// Implementations decide internally whether `mode` changes their behavior
/// (the subprocess backend rejects `Interim` outright).
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, samples: &[f32], mode: TranscribeMode) -> Result<String, BackendError>;
}
