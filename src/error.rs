//! Error types for the docrelay library.
//!
//! A single error enum covers the whole job lifecycle. The `Display` text of
//! the core variants is written for the end user: the controller records it
//! verbatim as the job's (or the retrieval's) error message, so a front end
//! can show `err.to_string()` without any further mapping.
//!
//! The taxonomy splits along recovery paths:
//!
//! * [`DocRelayError::Validation`]: nothing was sent; fix the input.
//! * [`DocRelayError::HttpStatus`] / [`DocRelayError::Parse`]: the service
//!   answered but not with something usable; re-submit later.
//! * [`DocRelayError::NotFound`]: a deferred result expired server-side;
//!   submit the file again.
//! * [`DocRelayError::Network`]: the service could not be reached.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docrelay library.
#[derive(Debug, Clone, Error)]
pub enum DocRelayError {
    // ── Core taxonomy ─────────────────────────────────────────────────────
    /// A precondition failed before any request was made.
    #[error("{0}")]
    Validation(String),

    /// Non-2xx response. `message` is the service's detail when it sent one.
    #[error("{message}")]
    HttpStatus { status: u16, message: String },

    /// A deferred result is unknown to the service or has expired.
    #[error("job not found or expired, submit the file again")]
    NotFound { task_id: String },

    /// Transport-level failure (connection refused, reset, timeout).
    #[error("{0}")]
    Network(String),

    /// A success response did not have the expected shape.
    #[error("malformed response from service: {0}")]
    Parse(String),

    // ── State-machine guards ──────────────────────────────────────────────
    /// `submit` was called while a submission is already in flight.
    #[error("a submission is already in progress")]
    AlreadySubmitting,

    /// A newer selection or submission replaced the job before it completed.
    /// Whatever its request produced was discarded.
    #[error("job replaced before it completed, its outcome was discarded")]
    Superseded,

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("input file not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the input file.
    #[error("permission denied reading '{path}'")]
    InputPermissionDenied { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write a retrieved artifact.
    #[error("failed to write output file '{path}': {reason}")]
    OutputWriteFailed { path: PathBuf, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

impl DocRelayError {
    /// The submit-time validation error.
    pub fn no_file_selected() -> Self {
        Self::Validation("no file selected, choose a file first".into())
    }

    /// The retrieval-time validation error.
    pub fn no_completed_job() -> Self {
        Self::Validation("no completed job yet, submit the file and wait for it to finish".into())
    }

    /// Generic fallback for a failed submission whose body gave no detail.
    pub fn request_failed(status: u16) -> Self {
        Self::HttpStatus {
            status,
            message: format!("request failed ({status}), please retry later"),
        }
    }

    /// Generic message for a failed retrieval that is not a 404.
    pub fn download_failed(status: u16) -> Self {
        Self::HttpStatus {
            status,
            message: format!("download failed ({status}), please retry later"),
        }
    }

    /// Transport failure during retrieval.
    pub fn service_unreachable() -> Self {
        Self::Network("cannot reach the download service, check that it is running".into())
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DocRelayError {
    fn from(e: reqwest::Error) -> Self {
        let msg = e.to_string();
        if msg.trim().is_empty() {
            Self::Network("network error, please retry".into())
        } else {
            Self::Network(msg)
        }
    }
}
