//! Synthetic progress for a submission that reports none.
//!
//! The service answers only once the whole conversion is done, so the
//! displayed value is derived from elapsed wall-clock time against the
//! [`crate::estimate`] ceiling. A concave easing curve makes the bar move
//! quickly at first and slow down as it nears [`SIMULATED_CAP`]; the final
//! jump to 100 (or the drop to the failure value) is made by the controller.
//!
//! Timestamps are [`tokio::time::Instant`] so tests can drive the clock with
//! `tokio::time::pause` / `advance`.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Highest value the simulation alone may reach.
pub const SIMULATED_CAP: f64 = 90.0;

/// Exponent of the easing curve; below 1 makes the curve concave.
const EASING_EXPONENT: f64 = 0.7;

/// Progress implied by `elapsed` out of `estimated`, in `[0, SIMULATED_CAP]`.
pub fn target_percent(elapsed: Duration, estimated: Duration) -> f64 {
    let ratio = if estimated.is_zero() {
        1.0
    } else {
        (elapsed.as_secs_f64() / estimated.as_secs_f64()).min(1.0)
    };
    (SIMULATED_CAP * ratio.powf(EASING_EXPONENT)).min(SIMULATED_CAP)
}

/// Displayed progress of the current submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    started_at: Option<Instant>,
    estimated: Duration,
    displayed_percent: f64,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            started_at: None,
            estimated: Duration::ZERO,
            displayed_percent: 0.0,
        }
    }
}

impl ProgressState {
    /// Begin a new submission at `now`, showing `initial_percent` right away.
    pub fn start(now: Instant, estimated: Duration, initial_percent: f64) -> Self {
        Self {
            started_at: Some(now),
            estimated,
            displayed_percent: initial_percent.clamp(0.0, SIMULATED_CAP),
        }
    }

    /// Recompute the target for `now` and raise the displayed value to it.
    ///
    /// Never lowers the displayed value; returns `true` if it changed.
    pub fn sample(&mut self, now: Instant) -> bool {
        let Some(started_at) = self.started_at else {
            return false;
        };
        let target = target_percent(now.saturating_duration_since(started_at), self.estimated);
        if target > self.displayed_percent {
            self.displayed_percent = target;
            true
        } else {
            false
        }
    }

    /// Set a terminal value chosen by the controller (100, 90, failure value).
    pub fn set_percent(&mut self, pct: f64) {
        self.displayed_percent = pct.clamp(0.0, 100.0);
    }

    pub fn percent(&self) -> f64 {
        self.displayed_percent
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn estimated(&self) -> Duration {
        self.estimated
    }
}

/// Handle to a running sampler task. Dropping it stops the task.
#[derive(Debug)]
pub struct Sampler {
    handle: JoinHandle<()>,
}

impl Sampler {
    /// Spawn a task calling `tick(now)` every `period`, first after one
    /// period. The task ends when `tick` returns `false` or the handle is
    /// stopped.
    pub fn spawn<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut(Instant) -> bool + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !tick(Instant::now()) {
                    debug!("Progress sampler finished");
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Abort the task. No tick runs after this returns, except one that is
    /// already executing on another worker thread.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
