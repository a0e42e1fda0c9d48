//! Processing-time estimate used to seed the progress simulator.
//!
//! The service gives no progress signal, so the bar needs a plausible
//! ceiling. Conversion time grows with the number of articles in the book,
//! which tracks file size closely enough for three coarse buckets.

use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Inputs below this size land in the small bucket.
pub const SMALL_LIMIT_BYTES: u64 = 2 * MIB;
/// Inputs below this size (and not small) land in the medium bucket.
pub const MEDIUM_LIMIT_BYTES: u64 = 8 * MIB;

const SMALL: Duration = Duration::from_secs(120);
const MEDIUM: Duration = Duration::from_secs(240);
const LARGE: Duration = Duration::from_secs(360);

/// Expected total processing time for an input of `size_bytes`.
pub fn estimate(size_bytes: u64) -> Duration {
    if size_bytes < SMALL_LIMIT_BYTES {
        SMALL
    } else if size_bytes < MEDIUM_LIMIT_BYTES {
        MEDIUM
    } else {
        LARGE
    }
}
