//! [`FrameLoop`] – the per-backend processing cadence.
//!
//! A ticker task fires at the backend's period.  On every tick it tries to
//! claim the in-flight flag; when the previous cycle is still running the
//! tick is skipped rather than queued, so a slow model yields bounded
//! staleness instead of a growing backlog.  Each claimed tick runs as its own
//! task, and only one cycle is ever in flight, which keeps callbacks strictly
//! ordered.
//!
//! Cycles must re-check [`LoopState::is_active`] after every await point
//! (use [`LoopState::emit`]) so a stopped backend never reports again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Shared state between a [`FrameLoop`], its ticker and its cycles.
#[derive(Debug)]
pub struct LoopState {
    name: &'static str,
    active: AtomicBool,
    in_flight: AtomicBool,
    idle: Notify,
    processed: AtomicU64,
    skipped: AtomicU64,
}

impl LoopState {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            active: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
            idle: Notify::new(),
            processed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `false` once [`FrameLoop::stop`] has begun.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of cycles that ran to completion.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Number of ticks dropped because a cycle was still in flight.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Hand `value` to `sink` only while the loop is still active.
    ///
    /// Returns whether the value was delivered.
    pub fn emit<T>(&self, value: T, sink: impl FnOnce(T)) -> bool {
        if self.is_active() {
            sink(value);
            true
        } else {
            trace!(frame_loop = self.name, "dropping output of stopped loop");
            false
        }
    }

    fn try_begin(self: &Arc<Self>) -> Option<CycleGuard> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return None;
        }
        // Re-check after claiming so a concurrent stop either sees this cycle
        // as in flight or this cycle sees the loop as stopped.
        if !self.is_active() {
            self.release();
            return None;
        }
        Some(CycleGuard(Arc::clone(self)))
    }

    fn release(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

/// Clears the in-flight flag when a cycle finishes, even if it panicked.
struct CycleGuard(Arc<LoopState>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.processed.fetch_add(1, Ordering::Relaxed);
        self.0.release();
    }
}

/// A running per-frame loop.  Dropping it stops the ticker without waiting.
pub struct FrameLoop {
    state: Arc<LoopState>,
    ticker: Option<JoinHandle<()>>,
}

impl FrameLoop {
    /// Start ticking every `period`, running `cycle` on each claimed tick.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(name: &'static str, period: Duration, cycle: F) -> Self
    where
        F: Fn(Arc<LoopState>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let state = Arc::new(LoopState::new(name));
        let ticker_state = Arc::clone(&state);

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !ticker_state.is_active() {
                    break;
                }
                let Some(guard) = ticker_state.try_begin() else {
                    ticker_state.skipped.fetch_add(1, Ordering::Relaxed);
                    trace!(frame_loop = name, "previous cycle still in flight; skipping tick");
                    continue;
                };
                let fut = cycle(Arc::clone(&ticker_state));
                tokio::spawn(async move {
                    fut.await;
                    drop(guard);
                });
            }
            debug!(frame_loop = name, "ticker exited");
        });

        debug!(frame_loop = name, period_ms = period.as_millis() as u64, "frame loop started");
        Self {
            state,
            ticker: Some(ticker),
        }
    }

    pub fn state(&self) -> &Arc<LoopState> {
        &self.state
    }

    /// Stop ticking and wait, at most `grace`, for the in-flight cycle.
    pub async fn stop(&mut self, grace: Duration) {
        self.state.active.store(false, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }

        let state = Arc::clone(&self.state);
        let drained = async move {
            loop {
                let idle = state.idle.notified();
                if !state.in_flight.load(Ordering::SeqCst) {
                    break;
                }
                idle.await;
            }
        };
        if tokio::time::timeout(grace, drained).await.is_err() {
            warn!(
                frame_loop = self.state.name,
                grace_ms = grace.as_millis() as u64,
                "in-flight cycle did not finish before teardown deadline"
            );
        }
        debug!(
            frame_loop = self.state.name,
            processed = self.state.processed(),
            skipped = self.state.skipped(),
            "frame loop stopped"
        );
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
