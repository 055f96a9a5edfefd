use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;

use voxstream_foundation::Task;

use crate::decoder::Decoder;
use crate::record::{Source, TranscriptRecord};
use crate::shared::PipelineShared;

#[derive(Debug, Clone)]
pub struct InterimConfig {
    pub period_seconds: f32,
    pub window_seconds: f32,
    pub min_window_seconds: f32,
    pub model: String,
    pub language: Option<String>,
    pub task: Task,
    pub sample_rate: u32,
}

/// Runs until `stop` is set, implementing the interim loop's per-tick steps:
/// suppression check, rolling-buffer snapshot, interim decode, final-overlap
/// dedup, render, and conditional delivery.
pub async fn run(shared: Arc<PipelineShared>, decoder: Arc<Decoder>, config: InterimConfig, stop: Arc<AtomicBool>) {
    let mut ticker = interval(Duration::from_secs_f32(config.period_seconds.max(0.001)));
    let mut last_sent: Option<String> = None;
    let window_samples = (config.window_seconds * config.sample_rate as f32) as usize;
    let min_window_samples = (config.min_window_seconds * config.sample_rate as f32) as usize;
    let overlap_window = Duration::from_secs_f32(config.window_seconds.max(2.5));

    while !stop.load(Ordering::Relaxed) {
        ticker.tick().await;
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if shared.suppressed() {
            continue;
        }

        let tail = shared.rolling.lock().tail(window_samples);
        if tail.len() < min_window_samples {
            continue;
        }

        let text = match decoder.decode_interim(&tail).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "interim decode failed");
                shared.metrics.backend_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        let trimmed = text.trim();
        if trimmed.is_empty() || shared.is_excluded(trimmed) {
            continue;
        }

        if let Some(last) = shared.last_final.lock().as_ref() {
            if last.at.elapsed() < overlap_window
                && (last.text.contains(trimmed) || trimmed.contains(last.text.as_str()))
            {
                continue;
            }
        }

        // Re-check: a final may have landed while this decode was in flight.
        if shared.suppressed() {
            continue;
        }

        shared.sink.show(trimmed);

        if last_sent.as_deref() == Some(trimmed) {
            continue;
        }
        last_sent = Some(trimmed.to_string());
        shared.metrics.interims_emitted.fetch_add(1, Ordering::Relaxed);

        if let Some(delivery) = &shared.delivery {
            let duration_ms = (tail.len() as f64 / config.sample_rate as f64 * 1000.0) as u64;
            let record = TranscriptRecord::new(
                shared.next_interim_seq(),
                trimmed.to_string(),
                true,
                Source::Interim,
                &config.model,
                config.language.clone(),
                config.task,
                config.sample_rate,
                duration_ms,
            );
            if let Ok(payload) = serde_json::to_string(&record) {
                delivery.send(payload);
            }
        }
    }
}
