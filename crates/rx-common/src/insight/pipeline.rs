//! Per-manager orchestration: aggregate, generate, log, trim, select,
//! polish, and persist, once per trailing window and then once more for
//! the pooled `overall` selection.

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::db::{
    append_candidates, fetch_active_days_pair, fetch_idle_avg, fetch_metric_pair, fetch_top_rank,
    fetch_totals_below, replace_selection, CandidateLogError, FactQueryError, MetricColumn,
    PgPool, SelectionKey, SelectionStorageError,
};
use crate::insight::config::InsightConfig;
use crate::insight::oracle::{severity_top, SelectionOracle};
use crate::insight::polish::enforce_caps;
use crate::insight::rules::{generate_candidates, WindowFacts, LOW_QUOTES_CUTOFF};
use crate::insight::trim::{split_and_trim, CandidatePools};
use crate::insight::windows::{build_windows, default_anchor, Window, OVERALL_LABEL};
use crate::{run_id, Candidate, Selection};

#[derive(Debug, thiserror::Error)]
pub enum InsightRunError {
    #[error("aggregate query failed: {0}")]
    Fact(#[from] FactQueryError),
    #[error("candidate log write failed: {0}")]
    CandidateLog(#[from] CandidateLogError),
    #[error("selection storage failed: {0}")]
    Storage(#[from] SelectionStorageError),
}

/// Counts for one processed window, for the runner's logs and metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutcome {
    pub label: String,
    pub candidates: usize,
    pub selected: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerRunSummary {
    pub manager_id: i64,
    pub run_id: String,
    pub windows: Vec<WindowOutcome>,
    pub overall_selected: usize,
}

impl ManagerRunSummary {
    pub fn total_candidates(&self) -> usize {
        self.windows.iter().map(|w| w.candidates).sum()
    }
}

/// Trimming keeps the top T by severity, which can leave the weakness side
/// with nothing but trivia when a manager's real problems sit below louder
/// noise. When every selected weakness scores under the floor, rebuild that
/// side from the full untrimmed pool.
fn rescue_weaknesses(
    selected: Vec<Candidate>,
    full_pool: &[Candidate],
    cfg: &InsightConfig,
) -> Vec<Candidate> {
    let max_severity = selected
        .iter()
        .map(|c| c.severity_score)
        .fold(f64::NEG_INFINITY, f64::max);

    if selected.is_empty() || max_severity >= cfg.weakness_rescue_floor {
        return selected;
    }
    severity_top(full_pool, cfg.final_per_polarity)
}

/// One full selection pass over pre-built pools: oracle pick, weakness
/// rescue, then cap enforcement per polarity. Pure apart from the oracle's
/// own I/O, so the severity strategy makes this fully deterministic.
pub async fn select_from_pools(
    oracle: &SelectionOracle,
    pools: &CandidatePools,
    window_label: &str,
    cfg: &InsightConfig,
) -> Selection {
    let (strengths, weaknesses) = oracle
        .select(
            &pools.trimmed_strengths,
            &pools.trimmed_weaknesses,
            window_label,
            cfg.final_per_polarity,
        )
        .await;

    let weaknesses = rescue_weaknesses(weaknesses, &pools.all_weaknesses, cfg);

    Selection {
        strengths: enforce_caps(
            strengths,
            &pools.trimmed_strengths,
            cfg.final_per_polarity,
            cfg.top_cap,
            cfg.max_per_user,
        ),
        weaknesses: enforce_caps(
            weaknesses,
            &pools.trimmed_weaknesses,
            cfg.final_per_polarity,
            cfg.top_cap,
            cfg.max_per_user,
        ),
    }
}

/// The `overall` selection spans the union of the trailing windows.
fn overall_span(windows: &[Window]) -> Option<(NaiveDate, NaiveDate)> {
    let start = windows.iter().map(|w| w.start).min()?;
    let end = windows.iter().map(|w| w.end).max()?;
    Some((start, end))
}

pub struct InsightEngine {
    pool: PgPool,
    oracle: SelectionOracle,
    config: InsightConfig,
}

impl InsightEngine {
    pub fn new(pool: PgPool, oracle: SelectionOracle, config: InsightConfig) -> Self {
        Self {
            pool,
            oracle,
            config,
        }
    }

    async fn fetch_window_facts(
        &self,
        manager_id: i64,
        window: &Window,
    ) -> Result<WindowFacts, FactQueryError> {
        let active_days = fetch_active_days_pair(&self.pool, manager_id, window)
            .await?
            .into_iter()
            .map(|row| (row.user_id, row))
            .collect();

        Ok(WindowFacts {
            outbounds: fetch_metric_pair(&self.pool, manager_id, MetricColumn::Outbounds, window)
                .await?,
            inbounds: fetch_metric_pair(&self.pool, manager_id, MetricColumn::Inbounds, window)
                .await?,
            quotes: fetch_metric_pair(&self.pool, manager_id, MetricColumn::QuotesUnique, window)
                .await?,
            ob_time: fetch_metric_pair(&self.pool, manager_id, MetricColumn::ObTimeMinutes, window)
                .await?,
            advisor_pro: fetch_metric_pair(
                &self.pool,
                manager_id,
                MetricColumn::AdvisorProMinutes,
                window,
            )
            .await?,
            idle_delta: fetch_metric_pair(
                &self.pool,
                manager_id,
                MetricColumn::IdleTimeSeconds,
                window,
            )
            .await?,
            idle_avg: fetch_idle_avg(&self.pool, manager_id, window).await?,
            low_quotes: fetch_totals_below(
                &self.pool,
                manager_id,
                MetricColumn::QuotesUnique,
                window,
                LOW_QUOTES_CUTOFF,
            )
            .await?,
            top_outbounds: fetch_top_rank(&self.pool, manager_id, MetricColumn::Outbounds, window)
                .await?,
            top_quoter: fetch_top_rank(&self.pool, manager_id, MetricColumn::QuotesUnique, window)
                .await?,
            active_days,
        })
    }

    /// Process one manager end to end with the production anchor
    /// (yesterday). The scheduler-facing entry point.
    pub async fn run_for_manager(
        &self,
        manager_id: i64,
    ) -> Result<ManagerRunSummary, InsightRunError> {
        self.run_for_manager_at(manager_id, default_anchor()).await
    }

    /// Process one manager end to end: every trailing window anchored to
    /// `anchor`, then the pooled `overall` pass. Empty aggregates produce
    /// empty selections, never errors; persistence failures abort the run.
    /// Used directly for backfills and date-pinned tests.
    #[instrument(skip(self), fields(oracle = self.oracle.name()))]
    pub async fn run_for_manager_at(
        &self,
        manager_id: i64,
        anchor: NaiveDate,
    ) -> Result<ManagerRunSummary, InsightRunError> {
        let run_id = format!("{}-{}", run_id::get(), run_id::generate());
        let windows = build_windows(anchor);

        let mut outcomes = Vec::with_capacity(windows.len());
        let mut overall_pool: Vec<Candidate> = Vec::new();

        for window in &windows {
            let facts = self.fetch_window_facts(manager_id, window).await?;
            let candidates = generate_candidates(manager_id, window, &facts, &self.config);
            append_candidates(&self.pool, &run_id, &candidates).await?;

            let candidate_count = candidates.len();
            let pools = split_and_trim(candidates, &self.config);
            let selection =
                select_from_pools(&self.oracle, &pools, &window.label, &self.config).await;

            let key = SelectionKey {
                manager_id,
                window_label: window.label.clone(),
                start_date: window.start,
                end_date: window.end,
            };
            replace_selection(&self.pool, &key, &selection).await?;

            info!(
                manager_id,
                window = %window.label,
                candidates = candidate_count,
                selected = selection.len(),
                "window selection persisted"
            );

            overall_pool.extend(selection.strengths.iter().cloned());
            overall_pool.extend(selection.weaknesses.iter().cloned());
            outcomes.push(WindowOutcome {
                label: window.label.clone(),
                candidates: candidate_count,
                selected: selection.len(),
            });
        }

        let overall_selected = match overall_span(&windows) {
            Some((start_date, end_date)) => {
                let pools = split_and_trim(overall_pool, &self.config);
                let selection =
                    select_from_pools(&self.oracle, &pools, OVERALL_LABEL, &self.config).await;

                let key = SelectionKey {
                    manager_id,
                    window_label: OVERALL_LABEL.to_string(),
                    start_date,
                    end_date,
                };
                replace_selection(&self.pool, &key, &selection).await?;

                info!(
                    manager_id,
                    selected = selection.len(),
                    "overall selection persisted"
                );
                selection.len()
            }
            None => 0,
        };

        Ok(ManagerRunSummary {
            manager_id,
            run_id,
            windows: outcomes,
            overall_selected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InsightType, Polarity};

    fn candidate(
        user_id: i64,
        insight_type: InsightType,
        polarity: Polarity,
        severity: f64,
    ) -> Candidate {
        Candidate {
            manager_id: 1,
            user_id,
            insight_type,
            polarity,
            title: "t".into(),
            message: "m".into(),
            metrics: serde_json::json!({}),
            severity_score: severity,
            window_label: "last_7_days".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 8, 18).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        }
    }

    fn weakness(user_id: i64, severity: f64) -> Candidate {
        candidate(user_id, InsightType::OutboundsDown, Polarity::Weakness, severity)
    }

    #[test]
    fn rescue_rebuilds_only_below_the_floor() {
        let cfg = InsightConfig::default();
        let full = vec![weakness(1, 0.4), weakness(2, 2.5), weakness(3, 0.3)];

        // All selected weaknesses trivial: rebuild from the full pool.
        let rescued = rescue_weaknesses(vec![weakness(1, 0.4), weakness(3, 0.3)], &full, &cfg);
        assert_eq!(rescued[0].user_id, 2);

        // One selected weakness clears the floor: keep the oracle's picks.
        let kept = vec![weakness(2, 2.5), weakness(1, 0.4)];
        assert_eq!(rescue_weaknesses(kept.clone(), &full, &cfg), kept);

        // Nothing selected means nothing to rescue.
        assert!(rescue_weaknesses(Vec::new(), &full, &cfg).is_empty());
    }

    #[tokio::test]
    async fn selection_pass_is_deterministic_and_cap_bounded() {
        let cfg = InsightConfig::default();
        let pools = split_and_trim(
            vec![
                candidate(1, InsightType::OutboundsUp, Polarity::Strength, 3.0),
                candidate(1, InsightType::QuotesUp, Polarity::Strength, 2.8),
                candidate(2, InsightType::InboundsUp, Polarity::Strength, 2.0),
                candidate(3, InsightType::TopOutbounds, Polarity::Strength, 1.1),
                candidate(4, InsightType::TopQuoter, Polarity::Strength, 1.1),
                weakness(5, 2.0),
                weakness(6, 1.5),
            ],
            &cfg,
        );

        let oracle = SelectionOracle::Severity;
        let first = select_from_pools(&oracle, &pools, "last_7_days", &cfg).await;
        let second = select_from_pools(&oracle, &pools, "last_7_days", &cfg).await;
        assert_eq!(first, second);

        assert_eq!(first.strengths.len(), 3);
        // One strength per user, at most one rank-class callout.
        let users: std::collections::HashSet<i64> =
            first.strengths.iter().map(|c| c.user_id).collect();
        assert_eq!(users.len(), 3);
        let rank_count = first
            .strengths
            .iter()
            .filter(|c| c.insight_type.is_rank_class())
            .count();
        assert!(rank_count <= 1);

        // Only two weaknesses exist; never padded.
        assert_eq!(first.weaknesses.len(), 2);
    }

    #[tokio::test]
    async fn trivial_weaknesses_are_rescued_from_the_full_pool() {
        let cfg = InsightConfig {
            target_candidates_per_polarity: 2,
            ..InsightConfig::default()
        };

        // A burst of same-severity trivia crowds the real weakness out of the
        // trimmed pool; the rescue must reach past the trim bound.
        let candidates = vec![
            weakness(1, 0.5),
            weakness(2, 0.5),
            weakness(3, 0.4),
            weakness(4, 0.3),
        ];
        let mut pools = split_and_trim(candidates, &cfg);
        pools.all_weaknesses.push(weakness(9, 3.0));

        let selection =
            select_from_pools(&SelectionOracle::Severity, &pools, "last_7_days", &cfg).await;
        assert!(selection.weaknesses.iter().any(|c| c.user_id == 9));
    }

    #[test]
    fn overall_span_covers_all_windows() {
        let windows = build_windows(NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
        let (start, end) = overall_span(&windows).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 7, 26).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());

        assert!(overall_span(&[]).is_none());
    }
}
