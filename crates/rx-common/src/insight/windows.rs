use chrono::{Days, NaiveDate, Utc};

/// Label of the synthetic manager-level window that pools all trailing
/// windows' winners.
pub const OVERALL_LABEL: &str = "overall";

/// Trailing window lengths, in days, evaluated per manager per run.
pub const WINDOW_LENGTHS_DAYS: [u64; 3] = [7, 14, 30];

/// A fixed calendar period. Every delta rule compares it against the
/// immediately preceding period of equal length (see [`Window::prev_range`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(label: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The immediately preceding period of equal length.
    pub fn prev_range(&self) -> (NaiveDate, NaiveDate) {
        let days = self.len_days() as u64;
        let prev_end = self
            .start
            .checked_sub_days(Days::new(1))
            .unwrap_or(self.start);
        let prev_start = prev_end
            .checked_sub_days(Days::new(days - 1))
            .unwrap_or(prev_end);
        (prev_start, prev_end)
    }
}

/// The trailing 7/14/30-day windows ending at `anchor`. Production anchors to
/// yesterday so a partially ingested "today" never skews deltas.
pub fn build_windows(anchor: NaiveDate) -> Vec<Window> {
    WINDOW_LENGTHS_DAYS
        .iter()
        .map(|&n| {
            let start = anchor.checked_sub_days(Days::new(n - 1)).unwrap_or(anchor);
            Window::new(format!("last_{n}_days"), start, anchor)
        })
        .collect()
}

/// Yesterday in UTC, the production anchor. Today is still being ingested
/// while the batch runs, so anchoring to it would skew every delta.
pub fn default_anchor() -> NaiveDate {
    let today = Utc::now().date_naive();
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

/// How many inactive prior-period days a delta rule tolerates before the
/// PTO/absence guard suppresses the row. Fixed per window length; anything
/// unrecognized falls back to the strictest tolerance.
pub fn absence_tolerance(label: &str) -> i64 {
    match label {
        "last_7_days" => 3,
        "last_14_days" => 6,
        "last_30_days" => 12,
        _ => 3,
    }
}
