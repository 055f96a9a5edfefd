use std::sync::Arc;

use tokio::sync::Mutex;

use voxstream_foundation::BackendError;
use voxstream_stt::{TranscribeMode, Transcriber};

/// The shared-model-vs-separate-model choice from the concurrency model:
/// `Shared` serializes interim decodes behind the same lock as finals, so a
/// single model instance serves both; `Split` gives the interim path its
/// own model and lock, allowing a final decode and an interim decode to run
/// at the same time.
pub enum Decoder {
    Shared {
        lock: Mutex<()>,
        model: Arc<dyn Transcriber>,
    },
    Split {
        final_lock: Mutex<()>,
        final_model: Arc<dyn Transcriber>,
        interim_lock: Mutex<()>,
        interim_model: Arc<dyn Transcriber>,
    },
}

impl Decoder {
    pub fn shared(model: Arc<dyn Transcriber>) -> Self {
        Decoder::Shared {
            lock: Mutex::new(()),
            model,
        }
    }

    pub fn split(final_model: Arc<dyn Transcriber>, interim_model: Arc<dyn Transcriber>) -> Self {
        Decoder::Split {
            final_lock: Mutex::new(()),
            final_model,
            interim_lock: Mutex::new(()),
            interim_model,
        }
    }

    pub async fn decode_final(&self, samples: &[f32]) -> Result<String, BackendError> {
        match self {
            Decoder::Shared { lock, model } => {
                let _guard = lock.lock().await;
                model.transcribe(samples, TranscribeMode::Final).await
            }
            Decoder::Split {
                final_lock,
                final_model,
                ..
            } => {
                let _guard = final_lock.lock().await;
                final_model.transcribe(samples, TranscribeMode::Final).await
            }
        }
    }

    pub async fn decode_interim(&self, samples: &[f32]) -> Result<String, BackendError> {
        match self {
            Decoder::Shared { lock, model } => {
                let _guard = lock.lock().await;
                model.transcribe(samples, TranscribeMode::Interim).await
            }
            Decoder::Split {
                interim_lock,
                interim_model,
                ..
            } => {
                let _guard = interim_lock.lock().await;
                interim_model
                    .transcribe(samples, TranscribeMode::Interim)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxstream_stt::MockTranscriber;

    #[tokio::test]
    async fn shared_decoder_serves_both_modes_from_one_model() {
        let decoder = Decoder::shared(Arc::new(MockTranscriber::new("hi")));
        assert_eq!(decoder.decode_final(&[0.0; 16]).await.unwrap(), "hi");
        assert_eq!(decoder.decode_interim(&[0.0; 16]).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn split_decoder_uses_distinct_models() {
        let decoder = Decoder::split(
            Arc::new(MockTranscriber::new("final-text")),
            Arc::new(MockTranscriber::new("interim-text")),
        );
        assert_eq!(
            decoder.decode_final(&[0.0; 16]).await.unwrap(),
            "final-text"
        );
        assert_eq!(
            decoder.decode_interim(&[0.0; 16]).await.unwrap(),
            "interim-text"
        );
    }
}
