//! The job state machine.
//!
//! ```text
//!            select_file                      responseOk
//!   ┌──────────────────────┐        ┌──────────────────────────▶ Succeeded
//!   ▼                      │        │
//!  Idle ──── submit ────▶ Submitting
//!   ▲                               │
//!   │                               └──────────────────────────▶ Failed
//!   └── select_file (from any phase)       responseNotOk / network
//! ```
//!
//! One [`JobController`] owns one job. Its state sits behind a mutex that is
//! never held across an `.await`; the submission future and the progress
//! sampler task both write to it, so every write is guarded by a generation
//! number. `select_file` and `submit` bump the generation; a sampler tick or
//! a network completion carrying an older number is discarded.
//!
//! The request and its write-back run on a spawned task. A caller that stops
//! polling `submit` or `retrieve` (a timeout, a dropped `select!` branch)
//! abandons only the wait: the outcome is still applied, or dropped as stale.

use crate::api::ApiClient;
use crate::config::ClientConfig;
use crate::error::DocRelayError;
use crate::estimate::estimate;
use crate::job::{JobSnapshot, Phase, ResultHandle, RetrievalState, SelectedInput};
use crate::observer::{NoopObserver, SharedObserver};
use crate::progress::{ProgressState, Sampler, SIMULATED_CAP};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Mutable job state. Only touched through [`lock`].
#[derive(Default)]
pub(crate) struct Inner {
    pub(crate) input: Option<SelectedInput>,
    pub(crate) phase: Phase,
    pub(crate) error_message: Option<String>,
    pub(crate) result: Option<ResultHandle>,
    pub(crate) progress: ProgressState,
    pub(crate) retrievals: BTreeMap<String, RetrievalState>,
    pub(crate) generation: u64,
    sampler: Option<Sampler>,
}

impl Inner {
    fn stop_sampler(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.stop();
        }
    }

    /// Drop everything derived from the previous submission and start a new
    /// generation.
    fn reset(&mut self) -> u64 {
        self.stop_sampler();
        self.generation += 1;
        self.phase = Phase::Idle;
        self.error_message = None;
        self.result = None;
        self.progress = ProgressState::default();
        self.retrievals.clear();
        self.generation
    }
}

pub(crate) fn lock(state: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owned handles moved into the task that performs a request and writes its
/// outcome back.
#[derive(Clone)]
pub(crate) struct Detached {
    pub(crate) api: ApiClient,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) state: Arc<Mutex<Inner>>,
    pub(crate) observer: SharedObserver,
}

/// Drives one job from file selection to retrieved artifacts.
///
/// Observer callbacks are invoked with the state lock held, which keeps
/// progress events in order; observers must not call back into the
/// controller.
///
/// # Example
/// ```rust,no_run
/// use docrelay::{ClientConfig, JobController, SelectedInput};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), docrelay::DocRelayError> {
/// let controller = JobController::new(ClientConfig::from_env()?)?;
/// controller.select_file(SelectedInput::from_path("weekly.epub").await?);
/// controller.submit().await?;
/// controller.retrieve("read").await?;
/// # Ok(())
/// # }
/// ```
pub struct JobController {
    pub(crate) api: ApiClient,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) state: Arc<Mutex<Inner>>,
    pub(crate) observer: SharedObserver,
}

impl JobController {
    pub fn new(config: ClientConfig) -> Result<Self, DocRelayError> {
        let config = Arc::new(config);
        Ok(Self {
            api: ApiClient::new(Arc::clone(&config))?,
            config,
            state: Arc::new(Mutex::new(Inner::default())),
            observer: Arc::new(NoopObserver),
        })
    }

    /// Replace the observer. Intended to be called before the first event.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The HTTP client, for the informational endpoints.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Choose a new input. Abandons any in-flight submission and clears the
    /// previous result.
    pub fn select_file(&self, input: SelectedInput) {
        let mut s = lock(&self.state);
        let was = s.phase;
        let generation = s.reset();
        info!(
            "Selected '{}' ({} bytes), generation {}",
            input.name(),
            input.size(),
            generation
        );
        if was == Phase::Submitting {
            debug!("Abandoned in-flight submission");
        }
        s.input = Some(input);
        self.observer.on_phase_change(Phase::Idle, None);
        self.observer.on_progress(0.0);
    }

    /// Send the selected file to the service and wait for the outcome.
    ///
    /// Exactly one request is made per call that gets past validation. The
    /// error is both returned and recorded as the job's message.
    ///
    /// # Errors
    /// - [`DocRelayError::Validation`]: no file selected; nothing was sent.
    /// - [`DocRelayError::AlreadySubmitting`]: a submission is in flight.
    /// - [`DocRelayError::Superseded`]: a newer selection or submission
    ///   replaced this one before it completed, including during the short
    ///   pause between the 90 % and 100 % steps.
    /// - any classified submission failure (job is now Failed).
    pub async fn submit(&self) -> Result<(), DocRelayError> {
        let (input, generation) = {
            let mut s = lock(&self.state);
            if s.phase == Phase::Submitting {
                debug!("Ignoring submit: already submitting");
                return Err(DocRelayError::AlreadySubmitting);
            }
            let Some(input) = s.input.clone() else {
                let err = DocRelayError::no_file_selected();
                let msg = err.to_string();
                warn!("{}", msg);
                s.error_message = Some(msg.clone());
                self.observer.on_phase_change(Phase::Idle, Some(&msg));
                return Err(err);
            };

            let generation = s.reset();
            let estimated = estimate(input.size());
            s.phase = Phase::Submitting;
            s.progress = ProgressState::start(Instant::now(), estimated, self.config.initial_percent);
            s.sampler = Some(self.spawn_sampler(generation));
            info!(
                "Submitting '{}', estimated {}s, generation {}",
                input.name(),
                estimated.as_secs(),
                generation
            );
            self.observer.on_phase_change(Phase::Submitting, None);
            self.observer.on_progress(s.progress.percent());
            (input, generation)
        };

        let work = self.detached();
        let task = tokio::spawn(async move {
            let outcome = work.api.submit(&input).await;
            work.finish_submission(generation, outcome).await
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                let err = DocRelayError::Internal(format!("submission task failed: {e}"));
                self.detached().finish_submission(generation, Err(err)).await
            }
        }
    }

    pub(crate) fn detached(&self) -> Detached {
        Detached {
            api: self.api.clone(),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            observer: Arc::clone(&self.observer),
        }
    }

    /// Start the periodic progress sampler for `generation`.
    ///
    /// The task holds only a weak reference so a dropped controller ends it.
    fn spawn_sampler(&self, generation: u64) -> Sampler {
        let state: Weak<Mutex<Inner>> = Arc::downgrade(&self.state);
        let observer = Arc::clone(&self.observer);
        Sampler::spawn(self.config.tick_interval, move |now| {
            let Some(state) = state.upgrade() else {
                return false;
            };
            let mut s = lock(&state);
            if s.generation != generation || s.phase != Phase::Submitting {
                return false;
            }
            if s.progress.sample(now) {
                observer.on_progress(s.progress.percent());
            }
            true
        })
    }

    pub fn phase(&self) -> Phase {
        lock(&self.state).phase
    }

    pub fn progress_percent(&self) -> f64 {
        lock(&self.state).progress.percent()
    }

    pub fn error_message(&self) -> Option<String> {
        lock(&self.state).error_message.clone()
    }

    pub fn result(&self) -> Option<ResultHandle> {
        lock(&self.state).result.clone()
    }

    /// Copy of the whole state for rendering or serialisation.
    pub fn snapshot(&self) -> JobSnapshot {
        let s = lock(&self.state);
        JobSnapshot {
            file_name: s.input.as_ref().map(|i| i.name().to_string()),
            file_size: s.input.as_ref().map(SelectedInput::size),
            phase: s.phase,
            error_message: s.error_message.clone(),
            progress_percent: s.progress.percent(),
            task_id: s
                .result
                .as_ref()
                .and_then(|r| r.task_id().map(str::to_owned)),
            inline_bytes: match &s.result {
                Some(ResultHandle::Inline { payload }) => Some(payload.len()),
                _ => None,
            },
            retrievals: s.retrievals.clone(),
        }
    }
}

impl Detached {
    /// Apply the outcome of the submission made for `generation`.
    pub(crate) async fn finish_submission(
        &self,
        generation: u64,
        outcome: Result<ResultHandle, DocRelayError>,
    ) -> Result<(), DocRelayError> {
        match outcome {
            Ok(handle) => {
                {
                    let mut s = lock(&self.state);
                    if s.generation != generation {
                        debug!("Dropping stale success for generation {}", generation);
                        return Err(DocRelayError::Superseded);
                    }
                    s.stop_sampler();
                    info!("Submission succeeded: {:?}", handle);
                    s.phase = Phase::Succeeded;
                    s.result = Some(handle);
                    s.progress.set_percent(SIMULATED_CAP);
                    self.observer.on_phase_change(Phase::Succeeded, None);
                    self.observer.on_progress(SIMULATED_CAP);
                }

                tokio::time::sleep(self.config.completion_delay).await;

                let mut s = lock(&self.state);
                if s.generation != generation {
                    debug!("Job replaced before completion of generation {}", generation);
                    return Err(DocRelayError::Superseded);
                }
                s.progress.set_percent(100.0);
                self.observer.on_progress(100.0);
                Ok(())
            }
            Err(err) => {
                let mut s = lock(&self.state);
                if s.generation != generation {
                    debug!("Dropping stale failure for generation {}: {}", generation, err);
                    return Err(DocRelayError::Superseded);
                }
                s.stop_sampler();
                let msg = err.to_string();
                warn!("Submission failed: {}", msg);
                s.phase = Phase::Failed;
                s.error_message = Some(msg.clone());
                s.progress.set_percent(self.config.failure_percent);
                self.observer.on_phase_change(Phase::Failed, Some(&msg));
                self.observer.on_progress(self.config.failure_percent);
                Err(err)
            }
        }
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        lock(&self.state).stop_sampler();
    }
}
