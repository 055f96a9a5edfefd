use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use voxstream_audio::{AudioCaptureThread, AudioFrame, FixedWindowSegmenter, FrameQueue};
use voxstream_delivery::DeliveryChannel;
use voxstream_foundation::{
    AppError, AudioConfig, ConfigError, DecoderBackend, DecoderConfig, InterimConfig as InterimSettings,
    Settings,
};
use voxstream_stt::Transcriber;
use voxstream_stt_whisper::{InProcessBackend, InProcessConfig};
use voxstream_telemetry::PipelineMetrics;
use voxstream_vad::{EnergyVadScorer, VadSegmenter, VadSegmenterConfig};

use crate::decoder::Decoder;
use crate::emitter::{self, EmitterConfig};
use crate::interim::{self, InterimConfig};
use crate::record::Source;
use crate::shared::PipelineShared;
use crate::sink::{InterimSink, NullSink, StderrSink};

/// Either segmentation strategy, producing a uniform stream of tagged
/// segments for the main loop to hand off to the decoder.
enum SegmenterKind {
    Fixed(FixedWindowSegmenter),
    Vad(VadSegmenter<EnergyVadScorer>),
}

struct SegmentOut {
    samples: Vec<f32>,
    source: Source,
}

impl SegmenterKind {
    fn push(&mut self, frame: &[f32]) -> Vec<SegmentOut> {
        match self {
            SegmenterKind::Fixed(s) => s
                .push(frame)
                .into_iter()
                .map(|samples| SegmentOut {
                    samples,
                    source: Source::Chunk,
                })
                .collect(),
            SegmenterKind::Vad(s) => s
                .push(frame)
                .into_iter()
                .map(|seg| SegmentOut {
                    samples: seg.samples,
                    source: Source::Vad,
                })
                .collect(),
        }
    }
}

fn model_name(decoder_cfg: &DecoderConfig) -> String {
    let path = match decoder_cfg.backend {
        DecoderBackend::InProcess => decoder_cfg.model_path.as_deref(),
        DecoderBackend::Subprocess => decoder_cfg.whispercpp_bin.as_deref(),
    };
    path.and_then(|p| Path::new(p).file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("whisper")
        .to_string()
}

fn build_in_process(model_path: &str, decoder_cfg: &DecoderConfig) -> Result<Arc<dyn Transcriber>, AppError> {
    let config = InProcessConfig {
        no_speech_threshold: decoder_cfg.no_speech_threshold,
        logprob_threshold: decoder_cfg.logprob_threshold,
        compression_ratio_threshold: decoder_cfg.compression_ratio_threshold,
        temperature: decoder_cfg.temperature,
        language: decoder_cfg.language.clone(),
        task: decoder_cfg.task,
        threads: decoder_cfg.whispercpp_threads.map(|t| t as i32).unwrap_or(4),
    };
    Ok(Arc::new(InProcessBackend::load(model_path, config)?))
}

fn build_final_model(decoder_cfg: &DecoderConfig, samplerate: u32) -> Result<Arc<dyn Transcriber>, AppError> {
    match decoder_cfg.backend {
        DecoderBackend::InProcess => {
            let model_path = decoder_cfg
                .model_path
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField("decoder.model_path".into()))?;
            build_in_process(model_path, decoder_cfg)
        }
        DecoderBackend::Subprocess => {
            let bin = decoder_cfg
                .whispercpp_bin
                .clone()
                .ok_or_else(|| ConfigError::MissingField("decoder.whispercpp_bin".into()))?;
            let model_path = decoder_cfg
                .model_path
                .clone()
                .ok_or_else(|| ConfigError::MissingField("decoder.model_path".into()))?;
            Ok(Arc::new(voxstream_stt::SubprocessBackend {
                bin,
                model_path,
                threads: decoder_cfg.whispercpp_threads,
                extra_args: decoder_cfg.whispercpp_extra_args.clone(),
                language: decoder_cfg.language.clone(),
                task: decoder_cfg.task,
                samplerate,
            }))
        }
    }
}

/// Builds the final-decode model per `decoder_cfg`, and — when
/// `interim.separate_model` names a second in-process model — a distinct
/// interim-decode model under its own lock (`Decoder::Split`). Otherwise
/// both modes share the one model and lock (`Decoder::Shared`).
fn build_decoder(
    decoder_cfg: &DecoderConfig,
    interim_cfg: &InterimSettings,
    samplerate: u32,
) -> Result<Decoder, AppError> {
    let final_model = build_final_model(decoder_cfg, samplerate)?;

    match &interim_cfg.separate_model {
        Some(path) => {
            let interim_model = build_in_process(path, decoder_cfg)?;
            Ok(Decoder::split(final_model, interim_model))
        }
        None => Ok(Decoder::shared(final_model)),
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_main_loop(
    receiver: Receiver<AudioFrame>,
    mut segmenter: SegmenterKind,
    decoder: Arc<Decoder>,
    shared: Arc<PipelineShared>,
    emitter_config: EmitterConfig,
    feed_rolling_buffer: bool,
    stop: Arc<AtomicBool>,
    rt: tokio::runtime::Handle,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("voxstream-main".into())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let frame = match receiver.recv_timeout(Duration::from_millis(200)) {
                    Ok(frame) => frame,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };

                if feed_rolling_buffer {
                    shared.rolling.lock().add(&frame.samples);
                }

                for segment in segmenter.push(&frame.samples) {
                    let len = segment.samples.len();
                    match rt.block_on(decoder.decode_final(&segment.samples)) {
                        Ok(text) => {
                            emitter::emit_final(&shared, &emitter_config, &text, segment.source, len)
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "final decode failed");
                            shared.metrics.backend_errors.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }
        })
        .expect("failed to spawn main loop thread")
}

/// Wires up capture, segmentation, decoding, emission, the interim loop, and
/// delivery from validated settings, then runs until interrupted.
pub async fn run(settings: Settings, list_devices: bool) -> Result<(), AppError> {
    settings.validate()?;

    if list_devices {
        for (name, rate, channels) in voxstream_audio::list_input_devices()? {
            println!("{name}  ({rate} Hz, {channels} ch)");
        }
        return Ok(());
    }

    let metrics = Arc::new(PipelineMetrics::default());
    let audio_config = AudioConfig {
        samplerate: settings.segmentation.samplerate,
        block_seconds: settings.segmentation.block_seconds,
        max_queue_frames: settings.segmentation.max_queue_frames,
    };
    let queue = Arc::new(FrameQueue::new(audio_config.max_queue_frames));
    let capture = AudioCaptureThread::spawn(
        audio_config,
        settings.device.clone(),
        queue.clone(),
        metrics.clone(),
    )?;

    let decoder = Arc::new(build_decoder(
        &settings.decoder,
        &settings.interim,
        settings.segmentation.samplerate,
    )?);
    let model = model_name(&settings.decoder);

    let sink: Arc<dyn InterimSink> = if settings.interim.enabled {
        Arc::new(StderrSink::new())
    } else {
        Arc::new(NullSink)
    };

    let delivery_channel = settings
        .delivery
        .url
        .as_ref()
        .map(|_| DeliveryChannel::spawn(settings.delivery.clone(), metrics.clone()));
    let delivery_sender = delivery_channel.as_ref().map(|c| c.sender());

    let rolling_capacity =
        ((settings.interim.window_seconds * settings.segmentation.samplerate as f32) as usize).max(1);
    let shared = Arc::new(PipelineShared::new(
        settings.filtering.excludes.clone(),
        rolling_capacity,
        sink,
        delivery_sender,
        metrics.clone(),
    ));

    let segmenter = if settings.vad.enabled {
        let vad_config = VadSegmenterConfig {
            enabled: true,
            threshold: settings.vad.threshold,
            end_silence_ms: settings.vad.end_silence_ms,
            pre_roll_ms: settings.vad.pre_roll_ms,
            min_speech_ms: (settings.vad.min_seconds * 1000.0) as u32,
            max_speech_ms: (settings.vad.max_seconds * 1000.0) as u32,
            samplerate: settings.segmentation.samplerate,
        };
        SegmenterKind::Vad(VadSegmenter::new(&vad_config, EnergyVadScorer::new()))
    } else {
        let chunk_samples =
            (settings.segmentation.chunk_seconds * settings.segmentation.samplerate as f32) as usize;
        let overlap_samples =
            (settings.segmentation.overlap_seconds * settings.segmentation.samplerate as f32) as usize;
        SegmenterKind::Fixed(FixedWindowSegmenter::new(chunk_samples, overlap_samples))
    };

    let stop = Arc::new(AtomicBool::new(false));
    let emitter_config = EmitterConfig {
        interim_enabled: settings.interim.enabled,
        period_seconds: settings.interim.period_seconds,
        model: model.clone(),
        language: settings.decoder.language.clone(),
        task: settings.decoder.task,
        sample_rate: settings.segmentation.samplerate,
    };

    let main_handle = spawn_main_loop(
        queue.receiver(),
        segmenter,
        decoder.clone(),
        shared.clone(),
        emitter_config,
        settings.interim.enabled,
        stop.clone(),
        tokio::runtime::Handle::current(),
    );

    let interim_handle = if settings.interim.enabled {
        let interim_config = InterimConfig {
            period_seconds: settings.interim.period_seconds,
            window_seconds: settings.interim.window_seconds,
            min_window_seconds: settings.interim.min_window_seconds,
            model,
            language: settings.decoder.language.clone(),
            task: settings.decoder.task,
            sample_rate: settings.segmentation.samplerate,
        };
        Some(tokio::spawn(interim::run(
            shared.clone(),
            decoder.clone(),
            interim_config,
            stop.clone(),
        )))
    } else {
        None
    };

    tracing::info!("voxstream pipeline running");
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    stop.store(true, Ordering::Relaxed);

    capture.stop();
    let _ = tokio::task::spawn_blocking(move || main_handle.join()).await;

    if let Some(handle) = interim_handle {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    if let Some(channel) = delivery_channel {
        channel.close().await;
    }

    Ok(())
}
