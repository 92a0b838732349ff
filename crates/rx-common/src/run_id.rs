//! Process-level run ID for the insight batch.
//!
//! Every candidate-log row written during one process lifetime shares the
//! same ULID, so the export layer can slice the log by run and re-runs on
//! the same day stay distinguishable.

use once_cell::sync::Lazy;
use ulid::Ulid;

static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Returns the process-level run ID (generated once, at first call).
/// ULIDs are 26 chars and sort lexicographically by creation time.
#[inline]
pub fn get() -> &'static str {
    &RUN_ID
}

/// Generates a fresh ULID for sub-runs, e.g. one per manager inside a
/// multi-manager batch.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}
