use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBackend {
    InProcess,
    Subprocess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Transcribe,
    Translate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub samplerate: u32,
    pub block_seconds: f32,
    pub chunk_seconds: f32,
    pub overlap_seconds: f32,
    pub max_queue_frames: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            samplerate: 16_000,
            block_seconds: 0.5,
            chunk_seconds: 5.0,
            overlap_seconds: 1.0,
            max_queue_frames: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub end_silence_ms: u32,
    pub pre_roll_ms: u32,
    pub min_seconds: f32,
    pub max_seconds: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.5,
            end_silence_ms: 300,
            pre_roll_ms: 150,
            min_seconds: 0.4,
            max_seconds: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterimConfig {
    pub enabled: bool,
    pub period_seconds: f32,
    pub window_seconds: f32,
    pub min_window_seconds: f32,
    /// Path to a second in-process model dedicated to interim decodes. When
    /// set, final and interim decodes each take their own lock and may run
    /// concurrently; when absent, both share the single decoder lock.
    pub separate_model: Option<String>,
}

impl Default for InterimConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_seconds: 0.5,
            window_seconds: 5.0,
            min_window_seconds: 1.0,
            separate_model: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub backend: DecoderBackend,
    pub model_path: Option<String>,
    pub no_speech_threshold: f32,
    pub logprob_threshold: f32,
    pub compression_ratio_threshold: f32,
    pub temperature: f32,
    pub language: Option<String>,
    pub task: Task,
    pub whispercpp_bin: Option<String>,
    pub whispercpp_threads: Option<u32>,
    pub whispercpp_extra_args: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            backend: DecoderBackend::InProcess,
            model_path: None,
            no_speech_threshold: 0.6,
            logprob_threshold: -1.0,
            compression_ratio_threshold: 2.4,
            temperature: 0.0,
            language: None,
            task: Task::Transcribe,
            whispercpp_bin: None,
            whispercpp_threads: None,
            whispercpp_extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub url: Option<String>,
    pub reconnect_seconds: f32,
    pub connect_timeout_seconds: f32,
    pub ping_seconds: f32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_seconds: 2.0,
            connect_timeout_seconds: 5.0,
            ping_seconds: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub excludes: HashSet<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device: Option<String>,
    pub segmentation: SegmentationConfig,
    pub vad: VadConfig,
    pub interim: InterimConfig,
    pub decoder: DecoderConfig,
    pub delivery: DeliveryConfig,
    pub filtering: FilterConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Loads defaults, layers an optional TOML file, then environment
    /// variables prefixed `VOXSTREAM_`. CLI flags are applied by the caller
    /// afterwards since they take highest precedence.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VOXSTREAM")
                .separator("__")
                .try_parsing(true),
        );

        let path_for_err = || config_path.map(Path::to_path_buf).unwrap_or_default();
        let built = builder.build().map_err(|source| ConfigError::Parse {
            path: path_for_err(),
            source,
        })?;
        // Every field carries `#[serde(default)]`, so keys absent from both
        // the file and the environment fall back to the struct Defaults
        // above rather than erroring.
        built
            .try_deserialize()
            .map_err(|source| ConfigError::Parse {
                path: path_for_err(),
                source,
            })
    }

    /// Startup validation. Must run before any device is opened or model
    /// loaded — a `ConfigError` here is fatal with exit code 2.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segmentation.overlap_seconds >= self.segmentation.chunk_seconds {
            return Err(ConfigError::Validation {
                field: "segmentation.overlap_seconds".into(),
                reason: format!(
                    "overlap_seconds ({}) must be less than chunk_seconds ({})",
                    self.segmentation.overlap_seconds, self.segmentation.chunk_seconds
                ),
            });
        }

        if self.vad.enabled && !matches!(self.segmentation.samplerate, 16_000 | 8_000) {
            return Err(ConfigError::Validation {
                field: "segmentation.samplerate".into(),
                reason: format!(
                    "VAD requires samplerate 16000 or 8000, got {}",
                    self.segmentation.samplerate
                ),
            });
        }

        if matches!(self.decoder.backend, DecoderBackend::Subprocess)
            && (self.decoder.model_path.is_none() || self.decoder.whispercpp_bin.is_none())
        {
            return Err(ConfigError::Validation {
                field: "decoder".into(),
                reason: "subprocess backend requires both model_path and whispercpp_bin".into(),
            });
        }

        Ok(())
    }
}
