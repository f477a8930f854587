//! Adaptive poll scheduler.
//!
//! Owns the refresh timer and all backoff state. Consumers receive
//! "time to refresh" signals through `wait_for_signal()`; fetch outcomes
//! are reported back through the three feedback methods, which adapt
//! the polling interval.
//!
//! Backoff is asymmetric: rate limits double the interval immediately
//! and server errors multiply it by 1.5x (both capped at 4x), while
//! recovery takes three consecutive clean fetches per halving. Any
//! backoff event forgets partial recovery progress.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tracing::{debug, info, warn};

const MAX_MULTIPLIER: f64 = 4.0;

/// Consecutive successes required before the multiplier halves.
const COOLDOWN_THRESHOLD: u32 = 3;

/// Mutable backoff state; guarded by the scheduler's lock and never
/// held across an await.
#[derive(Debug)]
struct Backoff {
    base_interval: Duration,
    multiplier: f64,
    consecutive_ok: u32,
}

impl Backoff {
    fn current_interval(&self) -> Duration {
        self.base_interval.mul_f64(self.multiplier)
    }
}

/// Emits "time to refresh" signals on an adaptive interval.
///
/// One dedicated background task drives the timer; every public method
/// is safe to call from any task. `wait_for_signal()` is designed for
/// exactly one consumer loop.
pub struct PollScheduler {
    backoff: Mutex<Backoff>,
    /// Capacity-1 signal channel: at most one refresh signal is ever
    /// pending, so bursts coalesce instead of queueing.
    signal_rx: AsyncMutex<mpsc::Receiver<()>>,
    refresh_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl PollScheduler {
    /// Start the timer task. The first signal is emitted immediately so
    /// the first refresh happens at startup, not after a full interval.
    pub fn new(base_interval: Duration) -> Arc<Self> {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = Arc::new(Self {
            backoff: Mutex::new(Backoff {
                base_interval,
                multiplier: 1.0,
                consecutive_ok: 0,
            }),
            signal_rx: AsyncMutex::new(signal_rx),
            refresh_tx,
            shutdown_tx,
        });

        tokio::spawn(Self::run_timer(
            Arc::clone(&scheduler),
            signal_tx,
            refresh_rx,
            shutdown_rx,
        ));

        scheduler
    }

    /// Block until it is time to refresh; `true` on a signal, `false`
    /// permanently once the scheduler has been stopped.
    pub async fn wait_for_signal(&self) -> bool {
        let mut rx = self.signal_rx.lock().await;
        while rx.recv().await.is_some() {
            if self.is_stopped() {
                // drain signals that raced with stop()
                continue;
            }
            return true;
        }
        false
    }

    /// Trigger an immediate refresh without blocking. A no-op while a
    /// refresh is already pending; on acceptance the timer restarts at
    /// the current effective interval measured from now.
    pub fn request_refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    /// Stop the timer task and close the signal channel. Idempotent and
    /// safe to call from any task.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("poll scheduler stopped");
        }
    }

    /// Whether `stop()` has been called. The dashboard surfaces this so
    /// a fatal credential error is visible externally.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// A rate-limit response: double the interval (capped) and forget
    /// recovery progress.
    pub fn on_rate_limited(&self) {
        let mut backoff = self.backoff.lock().expect("backoff lock poisoned");
        backoff.consecutive_ok = 0;
        backoff.multiplier = (backoff.multiplier * 2.0).min(MAX_MULTIPLIER);
        warn!(interval = ?backoff.current_interval(), "rate limited, backing off");
    }

    /// A server error: multiply the interval by 1.5x (capped) and
    /// forget recovery progress.
    pub fn on_server_error(&self) {
        let mut backoff = self.backoff.lock().expect("backoff lock poisoned");
        backoff.consecutive_ok = 0;
        backoff.multiplier = (backoff.multiplier * 1.5).min(MAX_MULTIPLIER);
        warn!(interval = ?backoff.current_interval(), "server error, backing off");
    }

    /// A clean fetch; after three in a row the multiplier halves
    /// (floored at 1.0).
    pub fn on_success(&self) {
        let mut backoff = self.backoff.lock().expect("backoff lock poisoned");
        backoff.consecutive_ok += 1;
        if backoff.consecutive_ok >= COOLDOWN_THRESHOLD && backoff.multiplier > 1.0 {
            backoff.multiplier = (backoff.multiplier / 2.0).max(1.0);
            backoff.consecutive_ok = 0;
            debug!(interval = ?backoff.current_interval(), "backoff eased");
        }
    }

    /// The effective polling interval: base x multiplier, never below
    /// base.
    pub fn current_interval(&self) -> Duration {
        self.backoff.lock().expect("backoff lock poisoned").current_interval()
    }

    /// The configured interval before any backoff.
    pub fn base_interval(&self) -> Duration {
        self.backoff.lock().expect("backoff lock poisoned").base_interval
    }

    async fn run_timer(
        self: Arc<Self>,
        signal_tx: mpsc::Sender<()>,
        mut refresh_rx: mpsc::Receiver<()>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        // immediate startup signal
        let _ = signal_tx.try_send(());

        loop {
            // re-read every iteration so backoff changes apply from the
            // next reset, not mid-sleep
            let interval = self.current_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let _ = signal_tx.try_send(());
                }
                Some(()) = refresh_rx.recv() => {
                    let _ = signal_tx.try_send(());
                }
                _ = shutdown_rx.changed() => {
                    // dropping signal_tx closes the signal channel
                    return;
                }
            }
        }
    }
}
