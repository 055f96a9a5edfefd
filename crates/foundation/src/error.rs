use std::path::PathBuf;
use thiserror::Error;

/// Top-level pipeline error. Fatal variants map onto the process exit codes
/// documented in the external-interfaces contract; `Backend`/`Delivery` are
/// recovered from inline and never unwind past the component that raised them.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Device(_) | AppError::Backend(_) | AppError::Delivery(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("input device not found: {name:?}")]
    NotFound { name: Option<String> },

    #[error("device disconnected")]
    Disconnected,

    #[error("requested stream format not supported: {0}")]
    FormatNotSupported(String),

    #[error("cpal stream error: {0}")]
    Stream(#[from] cpal::StreamError),

    #[error("cpal build-stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("cpal play-stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("cpal supported-configs error: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("cpal devices error: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("cpal default-stream-config error: {0}")]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),
}

/// A failed transcribe call. Always non-fatal: the segment's text becomes
/// empty and the pipeline continues.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("subprocess exited with status {status}: {stderr}")]
    SubprocessFailed { status: i32, stderr: String },

    #[error("subprocess produced no output file: {0:?}")]
    MissingOutput(PathBuf),

    #[error("in-process decoder failed: {0}")]
    DecodeFailed(String),

    #[error("I/O error writing temp WAV: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encode error: {0}")]
    Wav(#[from] hound::Error),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Marker for a segment dropped by a filtering rule (exclude list or
/// final-overlap dedup), as distinct from a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilteredOut;

#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    pub samplerate: u32,
    pub block_seconds: f32,
    /// Bounded frame queue depth; overflow drops the oldest queued frame.
    pub max_queue_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            samplerate: 16_000,
            block_seconds: 0.5,
            max_queue_frames: 20,
        }
    }
}
