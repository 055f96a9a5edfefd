use async_trait::async_trait;
use parking_lot::Mutex;
use voxstream_foundation::BackendError;

use crate::{TranscribeMode, Transcriber};

/// Returns the same configured text for both final and interim calls and
/// counts how many times it was invoked; used to drive the pipeline in
/// tests without a real acoustic model.
pub struct MockTranscriber {
    final_text: String,
    calls: Mutex<u32>,
}

impl MockTranscriber {
    pub fn new(final_text: impl Into<String>) -> Self {
        Self {
            final_text: final_text.into(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _samples: &[f32], mode: TranscribeMode) -> Result<String, BackendError> {
        *self.calls.lock() += 1;
        match mode {
            TranscribeMode::Final => Ok(self.final_text.clone()),
            TranscribeMode::Interim => Ok(self.final_text.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_text_and_counts_calls() {
        let mock = MockTranscriber::new("hello world");
        let text = mock.transcribe(&[0.0; 16], TranscribeMode::Final).await.unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(mock.call_count(), 1);
    }
}
