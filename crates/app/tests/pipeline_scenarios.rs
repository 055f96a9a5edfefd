//! End-to-end scenarios exercising the wiring across capture, segmentation,
//! decoding, emission/interim, and delivery with synthetic frame sources and
//! fake collaborators — never real hardware or a real model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;

use voxstream::decoder::Decoder;
use voxstream::emitter::{self, EmitterConfig};
use voxstream::interim::{self, InterimConfig};
use voxstream::record::Source;
use voxstream::shared::PipelineShared;
use voxstream::sink::InterimSink;
use voxstream_audio::{AudioFrame, FixedWindowSegmenter, FrameQueue};
use voxstream_delivery::DeliveryChannel;
use voxstream_foundation::{BackendError, DeliveryConfig, Task};
use voxstream_stt::{MockTranscriber, TranscribeMode, Transcriber};
use voxstream_telemetry::PipelineMetrics;
use voxstream_vad::{EnergyVadScorer, VadSegmenter, VadSegmenterConfig};

/// Returns "HELLO" for chunks carrying noticeable energy, empty text for
/// near-silent ones — a fake transcriber standing in for a real model.
struct MarkerTranscriber;

#[async_trait]
impl Transcriber for MarkerTranscriber {
    async fn transcribe(&self, samples: &[f32], _mode: TranscribeMode) -> Result<String, BackendError> {
        let mean_abs: f32 = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len().max(1) as f32;
        Ok(if mean_abs > 0.1 { "HELLO".to_string() } else { String::new() })
    }
}

fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * std::f32::consts::PI * i as f32 / 32.0).sin())
        .collect()
}

fn silence(len: usize) -> Vec<f32> {
    vec![0.0f32; len]
}

/// Records every `show`/`clear` call instead of touching a real terminal.
#[derive(Default)]
struct RecordingSink {
    shown: StdMutex<Vec<String>>,
}

impl InterimSink for RecordingSink {
    fn show(&self, text: &str) {
        self.shown.lock().unwrap().push(text.to_string());
    }
    fn clear(&self) {}
}

// S1: fixed-window segmenter over silence-then-speech, decoded with a fake
// transcriber that only "hears" the speech chunks.
#[tokio::test]
async fn s1_fixed_window_emits_chunks_containing_marker_text() {
    let samplerate = 16_000usize;
    let chunk_samples = 5 * samplerate;
    let overlap_samples = 1 * samplerate;
    let block_samples = samplerate / 2;

    let mut segmenter = FixedWindowSegmenter::new(chunk_samples, overlap_samples);
    let decoder = MarkerTranscriber;

    let mut texts = Vec::new();
    // 12 s of silence in 0.5 s blocks.
    for _ in 0..24 {
        for chunk in segmenter.push(&silence(block_samples)) {
            texts.push(decoder.transcribe(&chunk, TranscribeMode::Final).await.unwrap());
        }
    }
    // 3 s of a constant speech marker in 0.5 s blocks.
    for _ in 0..6 {
        for chunk in segmenter.push(&tone(block_samples)) {
            texts.push(decoder.transcribe(&chunk, TranscribeMode::Final).await.unwrap());
        }
    }

    assert!(texts.len() >= 2, "expected at least two chunks, got {}", texts.len());
    assert!(texts.iter().any(|t| t.contains("HELLO")), "no chunk decoded as HELLO: {texts:?}");
}

// S2: VAD start/end with pre-roll, decoded once on end-of-speech.
#[tokio::test]
async fn s2_vad_start_end_flushes_one_segment_in_expected_duration_range() {
    let config = VadSegmenterConfig {
        enabled: true,
        threshold: 0.5,
        end_silence_ms: 300,
        pre_roll_ms: 150,
        min_speech_ms: 400,
        max_speech_ms: 15_000,
        samplerate: 16_000,
    };
    let mut seg = VadSegmenter::new(&config, EnergyVadScorer::new());
    let window = 512usize; // window_samples_for_rate(16_000)

    let mut flushed = Vec::new();
    flushed.extend(seg.push(&silence(31 * window)));
    flushed.extend(seg.push(&tone(62 * window)));
    flushed.extend(seg.push(&silence(9 * window))); // end_silence_frames = round(300/32) = 9

    assert_eq!(flushed.len(), 1, "expected exactly one flushed segment");
    let segment = &flushed[0];
    assert!(!segment.forced);
    let duration_ms = segment.samples.len() as f32 / 16_000.0 * 1000.0;
    assert!(
        (2150.0..=2450.0).contains(&duration_ms),
        "duration {duration_ms}ms outside expected [2150, 2450] range"
    );
}

// S3: VAD force-cut under continuous speech, hysteresis resetting between cuts.
#[tokio::test]
async fn s3_vad_force_cut_yields_multiple_bounded_finals() {
    let config = VadSegmenterConfig {
        enabled: true,
        threshold: 0.5,
        end_silence_ms: 300,
        pre_roll_ms: 150,
        min_speech_ms: 400,
        max_speech_ms: 2_000,
        samplerate: 16_000,
    };
    let mut seg = VadSegmenter::new(&config, EnergyVadScorer::new());
    let window = 512usize;

    // 5.12 s of continuous speech (160 VAD frames), no gaps.
    let flushed = seg.push(&tone(160 * window));

    assert!(flushed.len() >= 2, "expected at least two forced cuts, got {}", flushed.len());
    for segment in &flushed {
        assert!(segment.forced);
        let duration_ms = segment.samples.len() as f32 / 16_000.0 * 1000.0;
        assert!(duration_ms <= 2100.0, "forced segment too long: {duration_ms}ms");
    }
}

// S4: a final opens the suppression window; any interim tick inside it must
// not reach the preview sink.
#[tokio::test]
async fn s4_interim_suppressed_after_final_never_reaches_sink() {
    let sink = Arc::new(RecordingSink::default());
    let shared = Arc::new(PipelineShared::new(
        Default::default(),
        16_000,
        sink.clone(),
        None,
        Arc::new(PipelineMetrics::default()),
    ));
    shared.rolling.lock().add(&tone(8_000));

    let emitter_config = EmitterConfig {
        interim_enabled: true,
        period_seconds: 0.5,
        model: "test".into(),
        language: None,
        task: Task::Transcribe,
        sample_rate: 16_000,
    };
    emitter::emit_final(&shared, &emitter_config, "alpha", Source::Chunk, 8_000);
    assert!(shared.suppressed());

    let decoder = Arc::new(Decoder::shared(Arc::new(MockTranscriber::new("alpha"))));
    let interim_config = InterimConfig {
        period_seconds: 0.1,
        window_seconds: 1.0,
        min_window_seconds: 0.1,
        model: "test".into(),
        language: None,
        task: Task::Transcribe,
        sample_rate: 16_000,
    };
    let stop = Arc::new(AtomicBool::new(false));
    let handle = tokio::spawn(interim::run(shared.clone(), decoder, interim_config, stop.clone()));

    // Suppression window is max(period_seconds * 2, 1.2 s) = 1.2 s; sample
    // well inside it.
    tokio::time::sleep(Duration::from_millis(800)).await;
    stop.store(true, Ordering::Relaxed);
    let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

    assert!(sink.shown.lock().unwrap().is_empty(), "interim reached the sink during suppression");
}

// S5: delivery reconnects after each message and every outbound record
// still arrives, each with a distinct seq.
#[tokio::test]
async fn s5_delivery_reconnects_and_all_records_arrive() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
    let received_server = received.clone();

    let server = tokio::spawn(async move {
        for _ in 0..3 {
            let Ok((stream, _)) = listener.accept().await else { break };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else { continue };
            if let Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) = ws.next().await {
                received_server.lock().unwrap().push(text.to_string());
            }
            // dropping `ws` closes the connection, forcing the client to reconnect.
        }
    });

    let metrics = Arc::new(PipelineMetrics::default());
    let channel = DeliveryChannel::spawn(
        DeliveryConfig {
            url: Some(format!("ws://127.0.0.1:{port}")),
            reconnect_seconds: 0.1,
            connect_timeout_seconds: 1.0,
            ping_seconds: 0.0,
        },
        metrics,
    );
    let sender = channel.sender();

    for seq in 1..=3u32 {
        sender.send(format!("{{\"seq\":{seq}}}"));
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    tokio::time::sleep(Duration::from_millis(250)).await;

    channel.close().await;
    let _ = tokio::time::timeout(Duration::from_secs(1), server).await;

    let got = received.lock().unwrap();
    assert_eq!(got.len(), 3, "expected all three records to arrive across reconnects: {got:?}");
    let seqs: Vec<u32> = got
        .iter()
        .map(|payload| serde_json::from_str::<serde_json::Value>(payload).unwrap()["seq"].as_u64().unwrap() as u32)
        .collect();
    assert_eq!(seqs.len(), seqs.iter().collect::<std::collections::HashSet<_>>().len(), "seq values must be distinct");
}

// S6: a stalled consumer never grows the queue past capacity, and resuming
// drains from at most `capacity * block_seconds` ago.
#[test]
fn s6_backpressure_caps_queue_and_bounds_staleness_on_resume() {
    let capacity = 20;
    let block = Duration::from_millis(500);
    let queue = FrameQueue::new(capacity);
    let metrics = PipelineMetrics::default();
    let base = Instant::now();

    let total_blocks = 60; // 30 s stalled at 0.5 s/block
    for i in 0..total_blocks {
        queue.push(
            AudioFrame {
                samples: Arc::from(vec![0.0f32; 1]),
                captured_at: base + block * i,
            },
            &metrics,
        );
    }

    let rx = queue.receiver();
    assert!(rx.len() <= capacity);

    let last_pushed_at = base + block * (total_blocks - 1);
    let oldest = rx.try_recv().expect("queue should still hold the most recent frames");
    let staleness = last_pushed_at.saturating_duration_since(oldest.captured_at);
    assert!(staleness <= Duration::from_secs(10), "oldest retained frame is {staleness:?} old");
}
