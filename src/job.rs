//! Job data model: the selected input, the lifecycle phase, the result
//! handle and per-kind retrieval bookkeeping.

use crate::error::DocRelayError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// A file may be selected; nothing is in flight.
    #[default]
    Idle,
    /// The submission request is in flight.
    Submitting,
    /// The service accepted the file and produced a result handle.
    Succeeded,
    /// The submission failed; see the job's error message.
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Submitting => "submitting",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The file chosen by the user, held in memory until the next selection.
#[derive(Clone)]
pub struct SelectedInput {
    name: String,
    bytes: Arc<[u8]>,
}

impl SelectedInput {
    /// Wrap an in-memory payload. `name` is the original file name and is
    /// sent as the multipart file name.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Read a local file into memory.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DocRelayError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DocRelayError::InputNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => DocRelayError::InputPermissionDenied {
                path: path.to_path_buf(),
            },
            _ => DocRelayError::Internal(format!("reading '{}': {e}", path.display())),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Selected {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SelectedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedInput")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Reference to a completed job's output.
#[derive(Clone, PartialEq, Eq)]
pub enum ResultHandle {
    /// The service keeps the artifacts; fetch them by kind with this token.
    Deferred { task_id: String },
    /// The submission response body was the artifact itself.
    Inline { payload: Arc<[u8]> },
}

impl ResultHandle {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ResultHandle::Deferred { task_id } => Some(task_id),
            ResultHandle::Inline { .. } => None,
        }
    }
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultHandle::Deferred { task_id } => {
                f.debug_struct("Deferred").field("task_id", task_id).finish()
            }
            ResultHandle::Inline { payload } => f
                .debug_struct("Inline")
                .field("bytes", &payload.len())
                .finish(),
        }
    }
}

/// One rendered output the service can produce for a deferred job.
///
/// `name` is the endpoint path segment; `prefix` distinguishes the saved
/// files of different kinds for the same input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKind {
    pub name: String,
    pub prefix: String,
}

impl ArtifactKind {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }

    /// The written translation.
    pub fn read() -> Self {
        Self::new("read", "read_")
    }

    /// The spoken-script rendition.
    pub fn listen() -> Self {
        Self::new("listen", "listen_")
    }

    /// Whether `name` can be used as a URL path segment and file prefix:
    /// non-empty ASCII letters, digits, `-` and `_`.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

/// Bookkeeping for one artifact kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalState {
    pub in_flight: bool,
    pub last_error: Option<String>,
    pub last_saved: Option<PathBuf>,
}

/// Point-in-time copy of a controller's state, safe to hand to a renderer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub phase: Phase,
    pub error_message: Option<String>,
    pub progress_percent: f64,
    /// Set for deferred results.
    pub task_id: Option<String>,
    /// Payload length for inline results.
    pub inline_bytes: Option<usize>,
    /// Keyed by artifact kind name.
    pub retrievals: BTreeMap<String, RetrievalState>,
}

impl JobSnapshot {
    pub fn has_result(&self) -> bool {
        self.task_id.is_some() || self.inline_bytes.is_some()
    }

    /// Whether a submit would do anything right now.
    pub fn can_submit(&self) -> bool {
        self.file_name.is_some() && self.phase != Phase::Submitting
    }

    /// Whether a retrieval of `kind` would issue a request (or save).
    pub fn can_retrieve(&self, kind: &str) -> bool {
        self.phase == Phase::Succeeded
            && self.has_result()
            && !self.retrievals.get(kind).is_some_and(|r| r.in_flight)
    }
}
