use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voxstream::pipeline;
use voxstream_foundation::{DecoderBackend, Settings, Task};

/// Initializes structured logging: stderr always, an optional daily-rotated
/// file if `--log-file` is set. `RUST_LOG` overrides the `-v` count when
/// present.
fn init_logging(
    verbosity: u8,
    log_file: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("voxstream.log");
            let _ = fs::create_dir_all(dir);
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, file_name);
            let (non_blocking_file, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(non_blocking_file).with_ansi(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

/// Removes rotated log files older than `retention_days`; `Some(0)` disables
/// pruning. Mirrors the file naming `RollingFileAppender` produces.
fn prune_old_logs(log_file: &Path, retention_days: u64) {
    if retention_days == 0 {
        return;
    }
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = log_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("voxstream.log")
        .to_string();

    let cutoff = match SystemTime::now().checked_sub(Duration::from_secs(retention_days * 86_400)) {
        Some(t) => t,
        None => return,
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !name.starts_with(&stem) || name == stem {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(modified) = meta.modified() {
                if modified < cutoff {
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "failed to prune old log");
                    } else {
                        tracing::info!(path = %path.display(), "pruned old log file");
                    }
                }
            }
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "voxstream", author, version, about = "Realtime speech-to-text pipeline")]
struct Cli {
    /// Path to a TOML config file, layered under environment and CLI overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    /// List input devices and exit without opening a stream.
    #[arg(long = "list-devices")]
    list_devices: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Additionally log to this file, rotated daily.
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Input device name; defaults to the host's default input device.
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    samplerate: Option<u32>,
    #[arg(long)]
    block_seconds: Option<f32>,
    #[arg(long)]
    chunk_seconds: Option<f32>,
    #[arg(long)]
    overlap_seconds: Option<f32>,
    #[arg(long)]
    max_queue_frames: Option<usize>,

    #[arg(long = "vad", overrides_with = "no_vad")]
    vad: bool,
    #[arg(long = "no-vad", overrides_with = "vad")]
    no_vad: bool,
    #[arg(long)]
    vad_threshold: Option<f32>,
    #[arg(long)]
    vad_end_silence_ms: Option<u32>,
    #[arg(long)]
    vad_pre_roll_ms: Option<u32>,
    #[arg(long)]
    vad_min_seconds: Option<f32>,
    #[arg(long)]
    vad_max_seconds: Option<f32>,

    #[arg(long = "interim", overrides_with = "no_interim")]
    interim: bool,
    #[arg(long = "no-interim", overrides_with = "interim")]
    no_interim: bool,
    #[arg(long)]
    interim_period_seconds: Option<f32>,
    #[arg(long)]
    interim_window_seconds: Option<f32>,
    #[arg(long)]
    interim_min_window_seconds: Option<f32>,
    /// Path to a dedicated in-process model for interim decodes; when set,
    /// final and interim decoding run under independent locks.
    #[arg(long)]
    interim_separate_model: Option<String>,

    #[arg(long, value_enum)]
    backend: Option<CliDecoderBackend>,
    #[arg(long)]
    model_path: Option<String>,
    #[arg(long)]
    language: Option<String>,
    #[arg(long, value_enum)]
    task: Option<CliTask>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    no_speech_threshold: Option<f32>,
    #[arg(long)]
    logprob_threshold: Option<f32>,
    #[arg(long)]
    compression_ratio_threshold: Option<f32>,
    #[arg(long)]
    whispercpp_bin: Option<String>,
    #[arg(long)]
    whispercpp_threads: Option<u32>,
    #[arg(long = "whispercpp-extra-args")]
    whispercpp_extra_args: Vec<String>,

    #[arg(long)]
    delivery_url: Option<String>,
    #[arg(long)]
    reconnect_seconds: Option<f32>,
    #[arg(long)]
    connect_timeout_seconds: Option<f32>,
    #[arg(long)]
    ping_seconds: Option<f32>,

    /// Text to drop silently; repeatable.
    #[arg(long = "exclude")]
    exclude: Vec<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliDecoderBackend {
    InProcess,
    Subprocess,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTask {
    Transcribe,
    Translate,
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if cli.device.is_some() {
        settings.device = cli.device.clone();
    }

    if let Some(v) = cli.samplerate {
        settings.segmentation.samplerate = v;
    }
    if let Some(v) = cli.block_seconds {
        settings.segmentation.block_seconds = v;
    }
    if let Some(v) = cli.chunk_seconds {
        settings.segmentation.chunk_seconds = v;
    }
    if let Some(v) = cli.overlap_seconds {
        settings.segmentation.overlap_seconds = v;
    }
    if let Some(v) = cli.max_queue_frames {
        settings.segmentation.max_queue_frames = v;
    }

    if cli.vad {
        settings.vad.enabled = true;
    }
    if cli.no_vad {
        settings.vad.enabled = false;
    }
    if let Some(v) = cli.vad_threshold {
        settings.vad.threshold = v;
    }
    if let Some(v) = cli.vad_end_silence_ms {
        settings.vad.end_silence_ms = v;
    }
    if let Some(v) = cli.vad_pre_roll_ms {
        settings.vad.pre_roll_ms = v;
    }
    if let Some(v) = cli.vad_min_seconds {
        settings.vad.min_seconds = v;
    }
    if let Some(v) = cli.vad_max_seconds {
        settings.vad.max_seconds = v;
    }

    if cli.interim {
        settings.interim.enabled = true;
    }
    if cli.no_interim {
        settings.interim.enabled = false;
    }
    if let Some(v) = cli.interim_period_seconds {
        settings.interim.period_seconds = v;
    }
    if let Some(v) = cli.interim_window_seconds {
        settings.interim.window_seconds = v;
    }
    if let Some(v) = cli.interim_min_window_seconds {
        settings.interim.min_window_seconds = v;
    }
    if cli.interim_separate_model.is_some() {
        settings.interim.separate_model = cli.interim_separate_model.clone();
    }

    if let Some(backend) = cli.backend {
        settings.decoder.backend = match backend {
            CliDecoderBackend::InProcess => DecoderBackend::InProcess,
            CliDecoderBackend::Subprocess => DecoderBackend::Subprocess,
        };
    }
    if cli.model_path.is_some() {
        settings.decoder.model_path = cli.model_path.clone();
    }
    if cli.language.is_some() {
        settings.decoder.language = cli.language.clone();
    }
    if let Some(task) = cli.task {
        settings.decoder.task = match task {
            CliTask::Transcribe => Task::Transcribe,
            CliTask::Translate => Task::Translate,
        };
    }
    if let Some(v) = cli.temperature {
        settings.decoder.temperature = v;
    }
    if let Some(v) = cli.no_speech_threshold {
        settings.decoder.no_speech_threshold = v;
    }
    if let Some(v) = cli.logprob_threshold {
        settings.decoder.logprob_threshold = v;
    }
    if let Some(v) = cli.compression_ratio_threshold {
        settings.decoder.compression_ratio_threshold = v;
    }
    if cli.whispercpp_bin.is_some() {
        settings.decoder.whispercpp_bin = cli.whispercpp_bin.clone();
    }
    if cli.whispercpp_threads.is_some() {
        settings.decoder.whispercpp_threads = cli.whispercpp_threads;
    }
    if !cli.whispercpp_extra_args.is_empty() {
        settings.decoder.whispercpp_extra_args = cli.whispercpp_extra_args.clone();
    }

    if cli.delivery_url.is_some() {
        settings.delivery.url = cli.delivery_url.clone();
    }
    if let Some(v) = cli.reconnect_seconds {
        settings.delivery.reconnect_seconds = v;
    }
    if let Some(v) = cli.connect_timeout_seconds {
        settings.delivery.connect_timeout_seconds = v;
    }
    if let Some(v) = cli.ping_seconds {
        settings.delivery.ping_seconds = v;
    }

    for text in &cli.exclude {
        settings.filtering.excludes.insert(text.clone());
    }

    settings
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref());
    if let Some(log_file) = &cli.log_file {
        let retention_days = std::env::var("VOXSTREAM_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(7);
        prune_old_logs(log_file, retention_days);
    }

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(2);
        }
    };
    let settings = apply_overrides(settings, &cli);

    if let Err(e) = pipeline::run(settings, cli.list_devices).await {
        tracing::error!(error = %e, "voxstream exiting");
        std::process::exit(e.exit_code());
    }
}
