use std::io::{self, Write};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use voxstream_foundation::Task;

use crate::record::{Source, TranscriptRecord};
use crate::shared::{LastFinal, PipelineShared};

#[derive(Debug, Clone)]
pub struct EmitterConfig {
    pub interim_enabled: bool,
    pub period_seconds: f32,
    pub model: String,
    pub language: Option<String>,
    pub task: Task,
    pub sample_rate: u32,
}

/// Commits one final transcript per the emitter's four steps: drop if
/// empty/excluded, reset the interim suppression state, write to stdout,
/// and (if delivery is configured) enqueue an outbound record.
pub fn emit_final(
    shared: &PipelineShared,
    config: &EmitterConfig,
    text: &str,
    source: Source,
    samples_len: usize,
) {
    let trimmed = text.trim();
    if trimmed.is_empty() || shared.is_excluded(trimmed) {
        return;
    }

    if config.interim_enabled {
        shared.sink.clear();
        shared.rolling.lock().clear();
        let suppress_for = Duration::from_secs_f32((config.period_seconds * 2.0).max(1.2));
        shared.suppress_for(suppress_for);
        *shared.last_final.lock() = Some(LastFinal {
            text: trimmed.to_string(),
            at: Instant::now(),
        });
    }

    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{trimmed}");
    let _ = stdout.flush();

    shared.metrics.finals_emitted.fetch_add(1, Ordering::Relaxed);

    if let Some(delivery) = &shared.delivery {
        let duration_ms = (samples_len as f64 / config.sample_rate as f64 * 1000.0) as u64;
        let record = TranscriptRecord::new(
            shared.next_final_seq(),
            trimmed.to_string(),
            false,
            source,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use std::collections::HashSet;
    use std::sync::Arc;
    use voxstream_telemetry::PipelineMetrics;

    fn config() -> EmitterConfig {
        EmitterConfig {
            interim_enabled: true,
            period_seconds: 0.5,
            model: "whisper".into(),
            language: None,
            task: Task::Transcribe,
            sample_rate: 16_000,
        }
    }

    #[test]
    fn excluded_text_produces_no_final_count() {
        let mut excludes = HashSet::new();
        excludes.insert("ignore me".to_string());
        let shared = PipelineShared::new(
            excludes,
            1600,
            Arc::new(NullSink),
            None,
            Arc::new(PipelineMetrics::default()),
        );
        emit_final(&shared, &config(), "ignore me", Source::Chunk, 1600);
        assert_eq!(shared.metrics.finals_emitted.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn committed_final_opens_suppression_window_and_clears_rolling_buffer() {
        let shared = PipelineShared::new(
            HashSet::new(),
            1600,
            Arc::new(NullSink),
            None,
            Arc::new(PipelineMetrics::default()),
        );
        shared.rolling.lock().add(&[0.1f32; 800]);
        emit_final(&shared, &config(), "hello there", Source::Vad, 8000);

        assert!(shared.suppressed());
        assert!(shared.rolling.lock().is_empty());
        assert_eq!(shared.metrics.finals_emitted.load(Ordering::Relaxed), 1);
        assert_eq!(
            shared.last_final.lock().as_ref().unwrap().text,
            "hello there"
        );
    }
}
