/// Tunables for one engine instance, passed in explicitly so tests can
/// override without global state. Defaults are the shipped product numbers.
#[derive(Debug, Clone)]
pub struct InsightConfig {
    /// Candidates kept per polarity after trimming (bounds ranking cost).
    pub target_candidates_per_polarity: usize,
    /// Final insights shown per polarity (F).
    pub final_per_polarity: usize,
    /// Max rank-class ("top_*") insights per selection. Never relaxed.
    pub top_cap: usize,
    /// Max insights per distinct user. Relaxed only as a last resort.
    pub max_per_user: usize,
    /// Deltas are clamped to this magnitude before severity scoring so one
    /// extreme swing cannot dominate the ranking. 5.0 == ±500 %.
    pub max_abs_delta_for_severity: f64,
    /// When the selected weaknesses all score below this floor, the weakness
    /// side is rebuilt from the full untrimmed pool.
    pub weakness_rescue_floor: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            target_candidates_per_polarity: 30,
            final_per_polarity: 3,
            top_cap: 1,
            max_per_user: 1,
            max_abs_delta_for_severity: 5.0,
            weakness_rescue_floor: 1.0,
        }
    }
}
