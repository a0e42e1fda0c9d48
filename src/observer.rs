//! Observer trait for job lifecycle events.
//!
//! Inject an [`Arc<dyn JobObserver>`] with
//! [`crate::JobController::with_observer`] to be told about phase changes,
//! progress samples and retrievals as they happen. A terminal front end can
//! drive a progress bar from it; a GUI can forward events to its own event
//! loop. The controller itself never depends on how events are rendered.
//!
//! Events are delivered while the controller's state lock is held, from
//! whichever task produced them (the sampler task for progress ticks, the
//! caller's task for everything else). Keep implementations short and never
//! call back into the controller from one.
//!
//! # Example
//!
//! ```rust
//! use docrelay::{JobObserver, Phase};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct PhaseLog(Mutex<Vec<Phase>>);
//!
//! impl JobObserver for PhaseLog {
//!     fn on_phase_change(&self, phase: Phase, _error: Option<&str>) {
//!         self.0.lock().unwrap().push(phase);
//!     }
//! }
//! ```

use crate::job::Phase;
use std::path::Path;
use std::sync::Arc;

/// Receives job events. All methods default to no-ops.
pub trait JobObserver: Send + Sync {
    /// The job entered `phase`. `error` is set when entering
    /// [`Phase::Failed`], or when a validation error left the job Idle.
    fn on_phase_change(&self, phase: Phase, error: Option<&str>) {
        let _ = (phase, error);
    }

    /// The displayed progress changed.
    fn on_progress(&self, percent: f64) {
        let _ = percent;
    }

    /// A retrieval of `kind` started.
    fn on_retrieval_start(&self, kind: &str) {
        let _ = kind;
    }

    /// A retrieval of `kind` was saved to `path`.
    fn on_retrieval_complete(&self, kind: &str, path: &Path) {
        let _ = (kind, path);
    }

    /// A retrieval of `kind` failed with a user-facing message.
    fn on_retrieval_error(&self, kind: &str, error: &str) {
        let _ = (kind, error);
    }
}

/// Observer that ignores everything. Used when none is configured.
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// Convenience alias for the type stored in the controller.
pub type SharedObserver = Arc<dyn JobObserver>;
