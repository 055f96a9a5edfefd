use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use voxstream_foundation::DeliveryConfig;
use voxstream_telemetry::PipelineMetrics;

const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// Cheap, cloneable handle for enqueueing outbound records. Decoupled from
/// `DeliveryChannel` so callers that only need to `send` (the emitter, the
/// interim loop) don't need to share ownership of the background task.
#[derive(Clone)]
pub struct DeliverySender {
    tx: mpsc::UnboundedSender<String>,
}

impl DeliverySender {
    /// Queues a text frame for delivery. Non-blocking: the queue is
    /// effectively unbounded, so this only fails once the background task
    /// has exited.
    pub fn send(&self, payload: String) {
        let _ = self.tx.send(payload);
    }
}

/// Background sender for outbound transcript records. Owns the socket for
/// its whole lifetime; the caller only ever touches a `DeliverySender`.
pub struct DeliveryChannel {
    tx: mpsc::UnboundedSender<String>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DeliveryChannel {
    pub fn spawn(config: DeliveryConfig, metrics: Arc<PipelineMetrics>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_task = stop.clone();

        let handle = tokio::spawn(async move {
            run(config, rx, metrics, stop_task).await;
        });

        Self {
            tx,
            stop,
            handle: Some(handle),
        }
    }

    /// Returns a cloneable sender decoupled from this channel's lifecycle.
    pub fn sender(&self) -> DeliverySender {
        DeliverySender {
            tx: self.tx.clone(),
        }
    }

    /// Queues a text frame for delivery. Non-blocking: the queue is
    /// effectively unbounded, so this only fails once the background task
    /// has exited.
    pub fn send(&self, payload: String) {
        let _ = self.tx.send(payload);
    }

    /// Signals shutdown and joins the background task with a 1 s timeout.
    pub async fn close(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }
    }
}

async fn run(
    config: DeliveryConfig,
    mut rx: mpsc::UnboundedReceiver<String>,
    metrics: Arc<PipelineMetrics>,
    stop: Arc<AtomicBool>,
) {
    let Some(url) = config.url.clone() else {
        return;
    };

    while !stop.load(Ordering::Relaxed) {
        let connect_result = tokio::time::timeout(
            Duration::from_secs_f32(config.connect_timeout_seconds),
            connect_async(&url),
        )
        .await;

        let ws_stream = match connect_result {
            Ok(Ok((stream, _response))) => stream,
            _ => {
                tracing::warn!(url = %url, "delivery connect failed, retrying");
                metrics.delivery_connected.store(false, Ordering::Relaxed);
                sleep_or_stop(Duration::from_secs_f32(config.reconnect_seconds), &stop).await;
                continue;
            }
        };

        metrics.delivery_connected.store(true, Ordering::Relaxed);
        tracing::info!(url = %url, "delivery connected");
        let (mut write, mut read) = ws_stream.split();
        let mut last_ping = tokio::time::Instant::now();

        'conn: while !stop.load(Ordering::Relaxed) {
            tokio::select! {
                biased;
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break 'conn,
                        Some(Err(_)) => break 'conn,
                        _ => {}
                    }
                }
                item = tokio::time::timeout(DEQUEUE_TIMEOUT, rx.recv()) => {
                    match item {
                        Ok(Some(payload)) => {
                            if write.send(Message::Text(payload.into())).await.is_err() {
                                break 'conn;
                            }
                        }
                        Ok(None) => {
                            // sender dropped: flush remaining pings never needed again
                            stop.store(true, Ordering::Relaxed);
                            break 'conn;
                        }
                        Err(_) => {} // dequeue timeout, fall through to ping check
                    }
                }
            }

            if config.ping_seconds > 0.0
                && last_ping.elapsed() >= Duration::from_secs_f32(config.ping_seconds)
            {
                if write
                    .send(Message::Text(r#"{"type":"ping"}"#.into()))
                    .await
                    .is_err()
                {
                    break 'conn;
                }
                last_ping = tokio::time::Instant::now();
            }
        }

        metrics.delivery_connected.store(false, Ordering::Relaxed);
        if !stop.load(Ordering::Relaxed) {
            metrics.delivery_reconnects.fetch_add(1, Ordering::Relaxed);
            sleep_or_stop(Duration::from_secs_f32(config.reconnect_seconds), &stop).await;
        }
    }
}

async fn sleep_or_stop(duration: Duration, stop: &Arc<AtomicBool>) {
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
