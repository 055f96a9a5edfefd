use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use voxstream_foundation::{AudioConfig, DeviceError};
use voxstream_telemetry::PipelineMetrics;

/// Immutable block of mono PCM samples as produced by the capture callback.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Arc<[f32]>,
    pub captured_at: Instant,
}

/// Bounded, single-producer single-consumer frame queue. Overflow drops the
/// oldest *already-queued* frame, never the one currently being pushed —
/// "drop oldest, keep newest" backpressure.
pub struct FrameQueue {
    tx: Sender<AudioFrame>,
    rx: Receiver<AudioFrame>,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx, capacity }
    }

    pub fn receiver(&self) -> Receiver<AudioFrame> {
        self.rx.clone()
    }

    /// Push a frame, silently dropping the oldest queued frame if full.
    /// Called only from the realtime audio callback.
    pub fn push(&self, frame: AudioFrame, metrics: &PipelineMetrics) {
        if let Err(crossbeam_channel::TrySendError::Full(frame)) = self.tx.try_send(frame) {
            let _ = self.rx.try_recv();
            metrics.record_capture_drop();
            // retry once; capacity just freed a slot
            let _ = self.tx.try_send(frame);
        }
        metrics.set_queue_depth(self.rx.len());
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn downmix(data: &[f32], channels: u16, scratch: &mut Vec<f32>) {
    if channels <= 1 {
        scratch.clear();
        scratch.extend_from_slice(data);
        return;
    }
    let channels = channels as usize;
    scratch.clear();
    scratch.reserve(data.len() / channels);
    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().sum();
        scratch.push(sum / channels as f32);
    }
}

/// Handle to the dedicated realtime capture thread. Stopping it tears down
/// the cpal stream; the thread itself never blocks or allocates beyond the
/// per-callback sample conversion.
pub struct AudioCaptureThread {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl AudioCaptureThread {
    /// Opens `device_name` (or the host default if `None`) at `config.samplerate`
    /// mono, and spawns the realtime thread pushing converted frames into `queue`.
    /// The cpal `Device`/`Stream` are not `Send`, so they are both constructed
    /// and kept alive entirely inside the spawned thread; only the result of
    /// the initial open attempt crosses back over a one-shot channel.
    pub fn spawn(
        config: AudioConfig,
        device_name: Option<String>,
        queue: Arc<FrameQueue>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self, DeviceError> {
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), DeviceError>>();

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let result = Self::open_and_run(config, device_name, queue, metrics, running_thread);
                if let Err(e) = result {
                    let _ = ready_tx.send(Err(e));
                } else {
                    let _ = ready_tx.send(Ok(()));
                }
            })
            .expect("failed to spawn audio capture thread");

        // The thread reports back once the stream is open (or failed to open);
        // after that it blocks running the stream until `stop` is called.
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Self {
                handle: Some(handle),
                running,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                running.store(false, Ordering::Relaxed);
                let _ = handle.join();
                Err(DeviceError::NotFound { name: None })
            }
        }
    }

    fn open_and_run(
        config: AudioConfig,
        device_name: Option<String>,
        queue: Arc<FrameQueue>,
        metrics: Arc<PipelineMetrics>,
        running: Arc<AtomicBool>,
    ) -> Result<(), DeviceError> {
        let host = cpal::default_host();
        let device = match &device_name {
            Some(name) => host
                .input_devices()
                .map_err(DeviceError::Devices)?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or(DeviceError::NotFound {
                    name: device_name.clone(),
                })?,
            None => host
                .default_input_device()
                .ok_or(DeviceError::NotFound { name: None })?,
        };

        let default_config = device.default_input_config()?;
        let sample_format = default_config.sample_format();
        let stream_config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(config.samplerate),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = stream_config.channels;

        let running_cb = running.clone();
        let queue_cb = queue.clone();
        let metrics_cb = metrics.clone();
        let err_fn = move |err: cpal::StreamError| {
            // Driver status is a value, never raised across the realtime
            // boundary as a panic.
            tracing::warn!(error = %err, "audio stream error");
        };

        let push_frame = move |mono: &[f32]| {
            if !running_cb.load(Ordering::Relaxed) {
                return;
            }
            metrics_cb.record_capture_frame();
            queue_cb.push(
                AudioFrame {
                    samples: Arc::from(mono),
                    captured_at: Instant::now(),
                },
                &metrics_cb,
            );
        };

        thread_local! {
            static SCRATCH: std::cell::RefCell<Vec<f32>> = const { std::cell::RefCell::new(Vec::new()) };
            static SCRATCH2: std::cell::RefCell<Vec<f32>> = const { std::cell::RefCell::new(Vec::new()) };
        }

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &_| {
                    SCRATCH.with(|buf| {
                        let mut s = buf.borrow_mut();
                        downmix(data, channels, &mut s);
                        push_frame(&s);
                    });
                },
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &_| {
                    SCRATCH2.with(|raw| {
                        let mut r = raw.borrow_mut();
                        r.clear();
                        r.extend(data.iter().map(|&v| v as f32 / 32768.0));
                        SCRATCH.with(|buf| {
                            let mut s = buf.borrow_mut();
                            downmix(&r, channels, &mut s);
                            push_frame(&s);
                        });
                    });
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &_| {
                    SCRATCH2.with(|raw| {
                        let mut r = raw.borrow_mut();
                        r.clear();
                        r.extend(data.iter().map(|&v| (v as i32 - 32768) as f32 / 32768.0));
                        SCRATCH.with(|buf| {
                            let mut s = buf.borrow_mut();
                            downmix(&r, channels, &mut s);
                            push_frame(&s);
                        });
                    });
                },
                err_fn,
                None,
            )?,
            SampleFormat::I32 => device.build_input_stream(
                &stream_config,
                move |data: &[i32], _: &_| {
                    SCRATCH2.with(|raw| {
                        let mut r = raw.borrow_mut();
                        r.clear();
                        r.extend(data.iter().map(|&v| v as f32 / 2_147_483_648.0));
                        SCRATCH.with(|buf| {
                            let mut s = buf.borrow_mut();
                            downmix(&r, channels, &mut s);
                            push_frame(&s);
                        });
                    });
                },
                err_fn,
                None,
            )?,
            SampleFormat::U32 => device.build_input_stream(
                &stream_config,
                move |data: &[u32], _: &_| {
                    SCRATCH2.with(|raw| {
                        let mut r = raw.borrow_mut();
                        r.clear();
                        r.extend(
                            data.iter()
                                .map(|&v| (v as i64 - 2_147_483_648) as f32 / 2_147_483_648.0),
                        );
                        SCRATCH.with(|buf| {
                            let mut s = buf.borrow_mut();
                            downmix(&r, channels, &mut s);
                            push_frame(&s);
                        });
                    });
                },
                err_fn,
                None,
            )?,
            SampleFormat::F64 => device.build_input_stream(
                &stream_config,
                move |data: &[f64], _: &_| {
                    SCRATCH2.with(|raw| {
                        let mut r = raw.borrow_mut();
                        r.clear();
                        r.extend(data.iter().map(|&v| v as f32));
                        SCRATCH.with(|buf| {
                            let mut s = buf.borrow_mut();
                            downmix(&r, channels, &mut s);
                            push_frame(&s);
                        });
                    });
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(DeviceError::FormatNotSupported(format!("{:?}", other)));
            }
        };

        stream.play()?;

        while running.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(100));
        }
        drop(stream);
        Ok(())
    }

    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioCaptureThread {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Lists input device names with their default input configuration. Startup
/// diagnostics only; never touches the realtime capture path.
pub fn list_input_devices() -> Result<Vec<(String, u32, u16)>, DeviceError> {
    let host = cpal::default_host();
    let mut out = Vec::new();
    for device in host.input_devices().map_err(DeviceError::Devices)? {
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        if let Ok(cfg) = device.default_input_config() {
            out.push((name, cfg.sample_rate().0, cfg.channels()));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Arc<PipelineMetrics> {
        Arc::new(PipelineMetrics::default())
    }

    #[test]
    fn queue_drops_oldest_on_overflow() {
        let q = FrameQueue::new(2);
        let m = metrics();
        for i in 0..5 {
            q.push(
                AudioFrame {
                    samples: Arc::from(vec![i as f32]),
                    captured_at: Instant::now(),
                },
                &m,
            );
        }
        let rx = q.receiver();
        assert!(rx.len() <= q.capacity());
        let first = rx.try_recv().unwrap();
        // the oldest surviving frame should be newer than frame 0
        assert!(first.samples[0] > 0.0);
    }

    #[test]
    fn downmix_averages_channels() {
        let mut scratch = Vec::new();
        downmix(&[1.0, 3.0, 2.0, 4.0], 2, &mut scratch);
        assert_eq!(scratch, vec![2.0, 3.0]);
    }
}
