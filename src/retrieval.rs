//! Artifact retrieval for a completed job.
//!
//! The [`ResultHandle`] decides the strategy:
//!
//! * `Inline`: the payload came back with the submission; it is written
//!   to `<base>.<ext>` without touching the network, as often as asked.
//! * `Deferred`: each kind is fetched from its own endpoint keyed by the
//!   task id. The service may forget the task, which surfaces as
//!   [`DocRelayError::NotFound`].
//!
//! Each kind has its own in-flight flag: a second request for a kind that is
//! still downloading is skipped, while different kinds run side by side.
//! Retrieval failures are recorded per kind and never change the job phase.

use crate::controller::{lock, Detached, JobController};
use crate::error::DocRelayError;
use crate::job::{ArtifactKind, Phase, ResultHandle};
use crate::save::{artifact_filename, save_artifact};
use futures::future::join_all;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Outcome of a [`JobController::retrieve`] call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// The artifact was written to this path.
    Saved(PathBuf),
    /// A retrieval of the same kind was already in flight; nothing was done.
    Skipped,
}

impl JobController {
    /// Fetch (or reuse) the artifact of `kind` and save it to the output
    /// directory.
    ///
    /// `kind` names the retrieval endpoint for deferred results. Kinds not
    /// listed in the config are allowed and get a `{kind}_` file prefix.
    /// For inline results the kind is only used for bookkeeping.
    pub async fn retrieve(&self, kind: &str) -> Result<Retrieval, DocRelayError> {
        if !ArtifactKind::is_valid_name(kind) {
            return Err(DocRelayError::Validation(format!(
                "'{kind}' is not a valid artifact kind"
            )));
        }

        let (handle, input_name, generation) = {
            let mut s = lock(&self.state);
            if s.retrievals.get(kind).is_some_and(|r| r.in_flight) {
                debug!("Retrieval of '{}' already in flight, skipping", kind);
                return Ok(Retrieval::Skipped);
            }

            let ready = match (s.phase, &s.result, &s.input) {
                (Phase::Succeeded, Some(handle), Some(input)) => {
                    Some((handle.clone(), input.name().to_string()))
                }
                _ => None,
            };
            let Some((handle, input_name)) = ready else {
                let err = DocRelayError::no_completed_job();
                let msg = err.to_string();
                s.retrievals.entry(kind.to_string()).or_default().last_error = Some(msg.clone());
                self.observer.on_retrieval_error(kind, &msg);
                return Err(err);
            };

            let entry = s.retrievals.entry(kind.to_string()).or_default();
            entry.in_flight = true;
            entry.last_error = None;
            self.observer.on_retrieval_start(kind);
            (handle, input_name, s.generation)
        };

        let work = self.detached();
        let owned_kind = kind.to_string();
        let task = tokio::spawn(async move {
            let outcome = work.fetch_and_save(&owned_kind, &handle, &input_name).await;
            work.finish_retrieval(&owned_kind, generation, outcome)
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                let err = DocRelayError::Internal(format!("retrieval task failed: {e}"));
                self.detached().finish_retrieval(kind, generation, Err(err))
            }
        }
    }

    /// Retrieve several kinds concurrently. Results are in `kinds` order.
    pub async fn retrieve_many(
        &self,
        kinds: &[String],
    ) -> Vec<(String, Result<Retrieval, DocRelayError>)> {
        let results = join_all(kinds.iter().map(|k| self.retrieve(k))).await;
        kinds.iter().cloned().zip(results).collect()
    }
}

impl Detached {
    async fn fetch_and_save(
        &self,
        kind: &str,
        handle: &ResultHandle,
        input_name: &str,
    ) -> Result<PathBuf, DocRelayError> {
        let ext = &self.config.output_extension;
        let (bytes, filename) = match handle {
            ResultHandle::Inline { payload } => {
                (payload.to_vec(), artifact_filename(input_name, "", ext))
            }
            ResultHandle::Deferred { task_id } => {
                let prefix = self
                    .config
                    .kind(kind)
                    .map(|k| k.prefix.clone())
                    .unwrap_or_else(|| format!("{kind}_"));
                let bytes = self.api.download(kind, task_id).await?;
                (bytes, artifact_filename(input_name, &prefix, ext))
            }
        };
        save_artifact(&self.config.output_dir, &filename, bytes).await
    }

    /// Record the outcome of a retrieval started under `generation` and
    /// release the kind's in-flight flag.
    fn finish_retrieval(
        &self,
        kind: &str,
        generation: u64,
        outcome: Result<PathBuf, DocRelayError>,
    ) -> Result<Retrieval, DocRelayError> {
        let mut s = lock(&self.state);
        if s.generation != generation {
            debug!("Job replaced during retrieval of '{}'; state left untouched", kind);
            return outcome.map(Retrieval::Saved);
        }
        let entry = s.retrievals.entry(kind.to_string()).or_default();
        entry.in_flight = false;
        match &outcome {
            Ok(path) => {
                entry.last_saved = Some(path.clone());
                self.observer.on_retrieval_complete(kind, path);
            }
            Err(e) => {
                let msg = e.to_string();
                warn!("Retrieval of '{}' failed: {}", kind, msg);
                entry.last_error = Some(msg.clone());
                self.observer.on_retrieval_error(kind, &msg);
            }
        }
        outcome.map(Retrieval::Saved)
    }
}
