//! Local persistence of retrieved artifacts.
//!
//! Files are written atomically: the bytes go to a temporary file in the
//! destination directory which is then renamed over the final name, so a
//! crash never leaves a half-written document behind.

use crate::error::DocRelayError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Base name used when the input name has nothing left after stripping.
const FALLBACK_BASE: &str = "result";

/// Input name with its extension removed, trimmed, and made safe to use as
/// a file name on every platform.
pub fn base_name(input_name: &str) -> String {
    let stem = match input_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => input_name,
    };
    let cleaned: String = stem
        .trim()
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        cleaned
    }
}

/// `{prefix}{base}.{ext}` for an artifact derived from `input_name`.
pub fn artifact_filename(input_name: &str, prefix: &str, ext: &str) -> String {
    format!("{prefix}{}.{ext}", base_name(input_name))
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}')
}

/// Write `bytes` to `dir/filename`, creating `dir` if needed.
pub async fn save_artifact(
    dir: &Path,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<PathBuf, DocRelayError> {
    let path = dir.join(filename);
    let write_failed = |reason: String| DocRelayError::OutputWriteFailed {
        path: path.clone(),
        reason,
    };

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| write_failed(e.to_string()))?;

    let dir_owned = dir.to_path_buf();
    let target = path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir_owned)?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| DocRelayError::Internal(format!("save task: {e}")))?
    .map_err(|e| write_failed(e.to_string()))?;

    info!("Saved {}", path.display());
    Ok(path)
}
