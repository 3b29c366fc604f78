//! Heartbeat keep-alive
//!
//! Sends heartbeat frames on the server-specified cadence and tracks
//! acknowledgments. Two consecutive unacknowledged beats are the sole
//! liveness signal: the task then cancels the `dead` token and the read loop
//! tears the connection down for a resume.

use crate::protocol::GatewayMessage;
use crate::session::SessionManager;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Unacknowledged beats tolerated before the connection is declared dead
pub const MAX_MISSED_ACKS: u32 = 2;

/// Ack state shared between the heartbeat task and the read loop
///
/// The counter is the only cross-task mutation on the hot path; everything
/// else on the connection is owned by the read loop.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    missed_acks: AtomicU32,
    last_sent: Mutex<Option<Instant>>,
    latency: Mutex<Option<Duration>>,
}

impl HeartbeatMonitor {
    /// Record a sent beat; returns how many are now unacknowledged
    pub fn beat_sent(&self) -> u32 {
        *self.last_sent.lock() = Some(Instant::now());
        self.missed_acks.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a heartbeat acknowledgment from the server
    pub fn ack(&self) {
        self.missed_acks.store(0, Ordering::SeqCst);
        if let Some(sent) = *self.last_sent.lock() {
            *self.latency.lock() = Some(sent.elapsed());
        }
    }

    /// Clear per-connection state at the start of a new attempt
    pub fn reset(&self) {
        self.missed_acks.store(0, Ordering::SeqCst);
        *self.last_sent.lock() = None;
    }

    /// Currently unacknowledged beats
    #[must_use]
    pub fn missed(&self) -> u32 {
        self.missed_acks.load(Ordering::SeqCst)
    }

    /// Most recent heartbeat round-trip time
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }
}

/// The heartbeat task for one connection attempt
pub struct Heartbeat {
    interval: Duration,
    jitter: bool,
    outbound: mpsc::Sender<GatewayMessage>,
    session: Arc<SessionManager>,
    monitor: Arc<HeartbeatMonitor>,
    /// Cancelled by this task when liveness is lost
    dead: CancellationToken,
    /// Cancelled by the connection when the attempt ends
    stop: CancellationToken,
}

impl Heartbeat {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        interval: Duration,
        jitter: bool,
        outbound: mpsc::Sender<GatewayMessage>,
        session: Arc<SessionManager>,
        monitor: Arc<HeartbeatMonitor>,
        dead: CancellationToken,
        stop: CancellationToken,
    ) -> Self {
        Self {
            interval,
            jitter,
            outbound,
            session,
            monitor,
            dead,
            stop,
        }
    }

    /// Spawn the heartbeat loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        // Jitter the first beat so a fleet reconnecting after an outage does
        // not synchronize its heartbeats
        let first_delay = if self.jitter {
            self.interval.mul_f64(rand::random::<f64>())
        } else {
            self.interval
        };
        if !self.sleep(first_delay).await {
            return;
        }

        loop {
            if self.monitor.missed() >= MAX_MISSED_ACKS {
                tracing::warn!(
                    missed = self.monitor.missed(),
                    "Heartbeat acks missed, declaring the connection dead"
                );
                self.dead.cancel();
                return;
            }

            let beat = GatewayMessage::heartbeat(self.session.sequence());
            if self.outbound.send(beat).await.is_err() {
                // writer is gone, the connection is already tearing down
                return;
            }
            let pending = self.monitor.beat_sent();
            tracing::trace!(pending, "Heartbeat sent");

            if !self.sleep(self.interval).await {
                return;
            }
        }
    }

    /// Returns false when the attempt was stopped during the wait
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.stop.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}
