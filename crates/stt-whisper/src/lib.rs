use async_trait::async_trait;
use parking_lot::Mutex;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use voxstream_foundation::{BackendError, Task};
use voxstream_stt::{TranscribeMode, Transcriber};

/// Decoder knobs carried over from `DecoderConfig`, minus the fields that
/// only apply to the subprocess backend.
#[derive(Debug, Clone)]
pub struct InProcessConfig {
    pub no_speech_threshold: f32,
    pub logprob_threshold: f32,
    /// Mapped onto whisper.cpp's `entropy_thold`, the closest full_params knob
    /// to a compression-ratio check: both reject a decode that degenerates
    /// into repetitive tokens.
    pub compression_ratio_threshold: f32,
    pub temperature: f32,
    pub language: Option<String>,
    pub task: Task,
    pub threads: i32,
}

impl Default for InProcessConfig {
    fn default() -> Self {
        Self {
            no_speech_threshold: 0.6,
            logprob_threshold: -1.0,
            compression_ratio_threshold: 2.4,
            temperature: 0.0,
            language: None,
            task: Task::Transcribe,
            threads: 4,
        }
    }
}

/// Whisper model handle, constructed once at startup and cached for the
/// process lifetime — loading is too slow to repeat per segment. Decode
/// calls are serialized through an internal lock since `whisper_rs` state
/// creation is not safe to run concurrently against one context.
pub struct InProcessBackend {
    ctx: WhisperContext,
    lock: Mutex<()>,
    config: InProcessConfig,
}

impl InProcessBackend {
    pub fn load(model_path: &str, config: InProcessConfig) -> Result<Self, BackendError> {
        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(model_path, params)
            .map_err(|e| BackendError::DecodeFailed(format!("failed to load model: {e}")))?;
        Ok(Self {
            ctx,
            lock: Mutex::new(()),
            config,
        })
    }

    fn decode_blocking(&self, samples: &[f32]) -> Result<String, BackendError> {
        let _guard = self.lock.lock();

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| BackendError::DecodeFailed(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(self.config.threads);
        params.set_translate(self.config.task == Task::Translate);
        params.set_temperature(self.config.temperature);
        params.set_no_speech_thold(self.config.no_speech_threshold);
        params.set_logprob_thold(self.config.logprob_threshold);
        params.set_entropy_thold(self.config.compression_ratio_threshold);
        if let Some(lang) = &self.config.language {
            params.set_language(Some(lang.as_str()));
        }

        state
            .full(params, samples)
            .map_err(|e| BackendError::DecodeFailed(e.to_string()))?;

        let num_segments = state.full_n_segments();
        let mut text = String::new();
        for i in 0..num_segments {
            let segment = state
                .get_segment(i)
                .ok_or_else(|| BackendError::DecodeFailed(format!("missing segment {i}")))?;
            text.push_str(
                &segment
                    .to_str()
                    .map_err(|e| BackendError::DecodeFailed(e.to_string()))?,
            );
        }

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for InProcessBackend {
    async fn transcribe(&self, samples: &[f32], _mode: TranscribeMode) -> Result<String, BackendError> {
        // whisper_rs's full() call runs synchronously for the length of the
        // audio; block_in_place keeps it off the async scheduler without
        // requiring a 'static clone of the context.
        tokio::task::block_in_place(|| self.decode_blocking(samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = InProcessConfig::default();
        assert_eq!(cfg.no_speech_threshold, 0.6);
        assert_eq!(cfg.logprob_threshold, -1.0);
        assert_eq!(cfg.compression_ratio_threshold, 2.4);
    }
}
