//! [`FramePipeline`] – tick-driven JPEG producer with circuit breaking.
//!
//! A background task captures one frame per tick and pushes the encoded
//! bytes into a bounded channel; the consumer reads until cancellation or
//! channel closure. Two independent self-healing rules govern the producer:
//!
//! * **Circuit breaker** – every failed tick increments a consecutive
//!   counter; once more than [`StreamConfig::failure_threshold`] ticks in a
//!   row have failed, the channel is closed and the stream ends. Any
//!   success resets the counter. The consumer restarts by constructing a
//!   new pipeline.
//! * **Stale refresh** – when no frame has succeeded for
//!   [`StreamConfig::stale_after`], a lightweight liveness ping is issued
//!   on the existing client handle before the next capture (at most once
//!   per staleness window). Best-effort: a failed ping is logged and the
//!   capture proceeds anyway. This is not a reconnect.
//!
//! Dropping the receiver releases the producer at its next tick; no
//! background work survives the consumer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use aerolink_net::Connection;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::frame::encode_jpeg;

/// Producer tuning. The defaults bound the viewer at 20 fps and tolerate
/// half a second of consecutive capture failures.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Fixed capture cadence, independent of capture latency.
    pub tick: Duration,
    /// Consecutive failures tolerated before the stream terminates.
    pub failure_threshold: u32,
    /// Silence interval after which the client is pinged before capturing.
    pub stale_after: Duration,
    /// Bounded channel capacity between producer and consumer.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            failure_threshold: 10,
            stale_after: Duration::from_secs(30),
            channel_capacity: 8,
        }
    }
}

/// Health counters for one streaming session. Shared read-only with the
/// diagnostics surface; reset by constructing a new pipeline, never
/// persisted.
#[derive(Debug)]
pub struct StreamHealth {
    consecutive_failures: AtomicU32,
    last_frame_len: AtomicUsize,
    last_success: Mutex<Instant>,
    last_refresh: Mutex<Instant>,
}

impl StreamHealth {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            consecutive_failures: AtomicU32::new(0),
            last_frame_len: AtomicUsize::new(0),
            last_success: Mutex::new(now),
            last_refresh: Mutex::new(now),
        }
    }

    /// Current run of consecutive failed ticks.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Size in bytes of the most recent encoded frame (0 before the first).
    pub fn last_frame_len(&self) -> usize {
        self.last_frame_len.load(Ordering::SeqCst)
    }

    /// Time since the last successful frame.
    pub fn silence(&self) -> Duration {
        self.last_success.lock().unwrap().elapsed()
    }

    fn record_success(&self, frame_len: usize) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.last_frame_len.store(frame_len, Ordering::SeqCst);
        *self.last_success.lock().unwrap() = Instant::now();
    }

    /// Returns the new consecutive-failure count.
    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn needs_refresh(&self, stale_after: Duration) -> bool {
        self.last_success.lock().unwrap().elapsed() > stale_after
            && self.last_refresh.lock().unwrap().elapsed() > stale_after
    }

    fn mark_refreshed(&self) {
        *self.last_refresh.lock().unwrap() = Instant::now();
    }
}

/// One streaming session over the shared connection.
pub struct FramePipeline {
    connection: Arc<Connection>,
    config: StreamConfig,
    health: Arc<StreamHealth>,
}

impl FramePipeline {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self::with_config(connection, StreamConfig::default())
    }

    pub fn with_config(connection: Arc<Connection>, config: StreamConfig) -> Self {
        Self {
            connection,
            config,
            health: Arc::new(StreamHealth::new()),
        }
    }

    /// Health counters, shareable with the diagnostics surface.
    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.health)
    }

    /// Capture, normalize, and encode one frame.
    ///
    /// Returns `None` — never an error — on capture failure, a malformed
    /// buffer, or encode failure. A reconnect racing this call simply makes
    /// the stale handle's capture fail, which lands here as an ordinary
    /// `None`.
    pub async fn next_frame(&self) -> Option<Vec<u8>> {
        let client = self.connection.client().await?;
        match client.capture_image().await {
            Ok(raw) => encode_jpeg(&raw),
            Err(e) => {
                debug!(error = %e, "frame capture failed");
                None
            }
        }
    }

    /// Start the producer. Returns the frame channel and the producer task
    /// handle. The stream is infinite until the consumer stops reading or
    /// the failure breaker trips; restart by constructing a new pipeline.
    pub fn spawn(self) -> (mpsc::Receiver<Vec<u8>>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let handle = tokio::spawn(async move {
            self.run(tx).await;
        });
        (rx, handle)
    }

    async fn run(self, tx: mpsc::Sender<Vec<u8>>) {
        let mut ticker = tokio::time::interval(self.config.tick);
        // A slow capture must not cause a burst of catch-up ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick = ?self.config.tick, "frame stream started");

        loop {
            ticker.tick().await;

            // Consumer gone — checked every tick, not just on emission.
            if tx.is_closed() {
                debug!("frame consumer disconnected, stopping producer");
                return;
            }

            if self.health.needs_refresh(self.config.stale_after) {
                self.refresh_liveness().await;
            }

            match self.next_frame().await {
                Some(frame) => {
                    self.health.record_success(frame.len());
                    if tx.send(frame).await.is_err() {
                        debug!("frame consumer disconnected, stopping producer");
                        return;
                    }
                }
                None => {
                    let failures = self.health.record_failure();
                    if failures > self.config.failure_threshold {
                        warn!(
                            failures,
                            threshold = self.config.failure_threshold,
                            "too many consecutive capture failures, ending stream"
                        );
                        return;
                    }
                }
            }
        }
    }

    /// Best-effort liveness re-confirmation on the existing handle.
    async fn refresh_liveness(&self) {
        self.health.mark_refreshed();
        let Some(client) = self.connection.client().await else {
            return;
        };
        match client.ping().await {
            Ok(()) => debug!("stale stream: liveness re-confirmed"),
            Err(e) => warn!(error = %e, "stale stream: liveness re-confirmation failed"),
        }
    }
}
