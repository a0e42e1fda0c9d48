//! Presentation model derived from a [`JobSnapshot`].
//!
//! Front ends render a [`StatusView`] rather than interpreting the state
//! machine themselves: one headline, a tone for colouring it, a progress
//! value with its caption, and which actions are enabled.

use crate::job::{JobSnapshot, Phase};
use serde::Serialize;

/// How the status line should be styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Busy,
    Success,
    Error,
    /// A non-fatal problem, e.g. a failed retrieval after a successful job.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub headline: String,
    pub tone: Tone,
    /// Secondary message shown under the headline.
    pub notice: Option<String>,
    /// `None` while idle: the bar is hidden.
    pub progress: Option<f64>,
    pub progress_caption: Option<&'static str>,
    pub file_label: String,
    pub submit_enabled: bool,
    pub submit_label: &'static str,
    /// Kind names whose retrieval is currently possible.
    pub retrievable: Vec<String>,
}

impl StatusView {
    /// Build the view for `snap`, listing the retrieval state of `kinds`.
    pub fn from_snapshot(snap: &JobSnapshot, kinds: &[String]) -> Self {
        let (headline, tone) = match snap.phase {
            Phase::Idle => ("Choose a file and submit it".to_string(), Tone::Neutral),
            Phase::Submitting => ("Processing, please wait".to_string(), Tone::Busy),
            Phase::Succeeded => ("Done, results are ready".to_string(), Tone::Success),
            Phase::Failed => (
                snap.error_message
                    .clone()
                    .unwrap_or_else(|| "Processing failed".to_string()),
                Tone::Error,
            ),
        };

        // Errors that did not fail the job: a validation message while Idle,
        // or the most recent retrieval failure.
        let notice = if snap.phase == Phase::Failed {
            None
        } else {
            snap.error_message.clone().or_else(|| {
                kinds
                    .iter()
                    .filter_map(|k| snap.retrievals.get(k))
                    .find_map(|r| r.last_error.clone())
            })
        };
        let tone = if notice.is_some() && tone != Tone::Busy {
            Tone::Warning
        } else {
            tone
        };

        let (progress, progress_caption) = match snap.phase {
            Phase::Idle => (None, None),
            Phase::Submitting => (Some(snap.progress_percent), Some("processing…")),
            Phase::Succeeded => (Some(snap.progress_percent), Some("complete")),
            Phase::Failed => (Some(snap.progress_percent), Some("failed")),
        };

        Self {
            headline,
            tone,
            notice,
            progress,
            progress_caption,
            file_label: snap
                .file_name
                .clone()
                .unwrap_or_else(|| "no file selected".to_string()),
            submit_enabled: snap.can_submit(),
            submit_label: if snap.phase == Phase::Submitting {
                "processing…"
            } else {
                "submit"
            },
            retrievable: kinds
                .iter()
                .filter(|k| snap.can_retrieve(k))
                .cloned()
                .collect(),
        }
    }
}
