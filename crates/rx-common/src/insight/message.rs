//! Display wording for stored insights.
//!
//! Rules build raw messages ending in ` (<window_label>).` so the candidate
//! stays self-describing through trimming and ranking; persistence swaps the
//! suffix for reader-friendly wording right before the row is written.

fn pretty_window(label: &str) -> &str {
    match label {
        "last_7_days" => "the last week",
        "last_14_days" => "the last couple weeks",
        // overall spans all windows; month wording reads fine.
        "last_30_days" | "overall" => "the last month",
        other => other,
    }
}

/// Rewrite `"... (last_7_days)."` into `"... in the last week."`. Messages
/// without the expected suffix pass through untouched.
pub fn prettify_message(raw: &str, window_label: &str) -> String {
    let suffix = format!(" ({window_label}).");
    match raw.strip_suffix(&suffix) {
        Some(stripped) => format!("{stripped} in {}.", pretty_window(window_label)),
        None => raw.to_string(),
    }
}
