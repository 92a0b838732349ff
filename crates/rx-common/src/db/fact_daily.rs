use deadpool_postgres::PoolError;
use tokio_postgres::Error as PgError;
use tracing::instrument;

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::insight::windows::Window;

#[derive(Debug, thiserror::Error)]
pub enum FactQueryError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
}

/// Columns of `fact_daily` the rules aggregate over. Rendering goes through
/// `as_sql` so rule definitions can never inject arbitrary SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricColumn {
    Outbounds,
    Inbounds,
    QuotesUnique,
    ObTimeMinutes,
    AdvisorProMinutes,
    IdleTimeSeconds,
}

impl MetricColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            MetricColumn::Outbounds => "outbounds",
            MetricColumn::Inbounds => "inbounds",
            MetricColumn::QuotesUnique => "quotes_unique",
            MetricColumn::ObTimeMinutes => "ob_time_minutes",
            MetricColumn::AdvisorProMinutes => "advisor_pro_minutes",
            MetricColumn::IdleTimeSeconds => "idle_time_seconds",
        }
    }
}

/// Current vs previous period totals for one user on one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPairRow {
    pub user_id: i64,
    pub name: String,
    pub cur_val: f64,
    pub prev_val: f64,
}

impl MetricPairRow {
    /// Percentage delta against the previous period, or `None` when the
    /// previous total is under the rule's minimum baseline. A sub-baseline
    /// denominator turns ordinary noise into huge swings, so the rule must
    /// stay silent regardless of `cur_val`.
    pub fn delta_pct(&self, min_prev: f64) -> Option<f64> {
        if self.prev_val < min_prev {
            return None;
        }
        Some((self.cur_val - self.prev_val) / self.prev_val)
    }
}

/// Active-day counts for one user in the current and previous period.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDaysRow {
    pub user_id: i64,
    pub cur_active_days: i64,
    pub prev_active_days: i64,
}

/// Window total for one user on one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTotalRow {
    pub user_id: i64,
    pub name: String,
    pub total: f64,
}

/// Average idle seconds per tracked day for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleAvgRow {
    pub user_id: i64,
    pub name: String,
    pub idle_avg_sec: f64,
}

// A day counts as active when any tracked raw signal is nonzero. Broad on
// purpose so PTO/absence shows up as fully inactive days.
const ACTIVE_DAY_EXPR: &str = "(COALESCE(fd.outbounds, 0)
     + COALESCE(fd.inbounds, 0)
     + COALESCE(fd.quotes_unique, 0)
     + COALESCE(fd.keystrokes, 0)
     + COALESCE(fd.mouse_clicks, 0)
     + COALESCE(fd.advisor_pro_minutes, 0)
     + COALESCE(fd.ob_time_minutes, 0)
     + COALESCE(fd.ib_time_minutes, 0)
     + COALESCE(fd.vc_items, 0)) > 0";

/// Per-user current vs previous window totals for one metric. Users with no
/// rows in either period still appear with zero totals.
#[instrument(skip(pool, window))]
pub async fn fetch_metric_pair(
    pool: &PgPool,
    manager_id: i64,
    metric: MetricColumn,
    window: &Window,
) -> Result<Vec<MetricPairRow>, FactQueryError> {
    let client = pool.get().await?;
    let (prev_start, prev_end) = window.prev_range();

    let sql = format!(
        "WITH cur AS (
            SELECT fd.user_id, SUM(fd.{col})::float8 AS cur_val
            FROM fact_daily fd
            JOIN users u ON u.id = fd.user_id
            WHERE u.manager_id = $1 AND fd.date BETWEEN $2 AND $3
            GROUP BY fd.user_id
        ),
        prev AS (
            SELECT fd.user_id, SUM(fd.{col})::float8 AS prev_val
            FROM fact_daily fd
            JOIN users u ON u.id = fd.user_id
            WHERE u.manager_id = $1 AND fd.date BETWEEN $4 AND $5
            GROUP BY fd.user_id
        )
        SELECT u.id AS user_id,
               u.name AS name,
               COALESCE(cur.cur_val, 0)::float8 AS cur_val,
               COALESCE(prev.prev_val, 0)::float8 AS prev_val
        FROM users u
        LEFT JOIN cur ON cur.user_id = u.id
        LEFT JOIN prev ON prev.user_id = u.id
        WHERE u.manager_id = $1",
        col = metric.as_sql()
    );

    let rows = client
        .timed_query_cached(
            &sql,
            &[
                &manager_id,
                &window.start,
                &window.end,
                &prev_start,
                &prev_end,
            ],
            "fact_daily.metric_pair",
        )
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MetricPairRow {
            user_id: row.get("user_id"),
            name: row.get("name"),
            cur_val: row.get("cur_val"),
            prev_val: row.get("prev_val"),
        })
        .collect())
}

/// Per-user active-day counts for the window and its preceding period.
#[instrument(skip(pool, window))]
pub async fn fetch_active_days_pair(
    pool: &PgPool,
    manager_id: i64,
    window: &Window,
) -> Result<Vec<ActiveDaysRow>, FactQueryError> {
    let client = pool.get().await?;
    let (prev_start, prev_end) = window.prev_range();

    let sql = format!(
        "WITH cur AS (
            SELECT fd.user_id,
                   SUM(CASE WHEN {active} THEN 1 ELSE 0 END)::int8 AS cur_active_days
            FROM fact_daily fd
            JOIN users u ON u.id = fd.user_id
            WHERE u.manager_id = $1 AND fd.date BETWEEN $2 AND $3
            GROUP BY fd.user_id
        ),
        prev AS (
            SELECT fd.user_id,
                   SUM(CASE WHEN {active} THEN 1 ELSE 0 END)::int8 AS prev_active_days
            FROM fact_daily fd
            JOIN users u ON u.id = fd.user_id
            WHERE u.manager_id = $1 AND fd.date BETWEEN $4 AND $5
            GROUP BY fd.user_id
        )
        SELECT u.id AS user_id,
               COALESCE(cur.cur_active_days, 0)::int8 AS cur_active_days,
               COALESCE(prev.prev_active_days, 0)::int8 AS prev_active_days
        FROM users u
        LEFT JOIN cur ON cur.user_id = u.id
        LEFT JOIN prev ON prev.user_id = u.id
        WHERE u.manager_id = $1",
        active = ACTIVE_DAY_EXPR
    );

    let rows = client
        .timed_query_cached(
            &sql,
            &[
                &manager_id,
                &window.start,
                &window.end,
                &prev_start,
                &prev_end,
            ],
            "fact_daily.active_days_pair",
        )
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ActiveDaysRow {
            user_id: row.get("user_id"),
            cur_active_days: row.get("cur_active_days"),
            prev_active_days: row.get("prev_active_days"),
        })
        .collect())
}

/// Users whose window total on `metric` is strictly below `cutoff`.
#[instrument(skip(pool, window))]
pub async fn fetch_totals_below(
    pool: &PgPool,
    manager_id: i64,
    metric: MetricColumn,
    window: &Window,
    cutoff: f64,
) -> Result<Vec<MetricTotalRow>, FactQueryError> {
    let client = pool.get().await?;

    let sql = format!(
        "SELECT u.id AS user_id,
                u.name AS name,
                COALESCE(SUM(fd.{col}), 0)::float8 AS total
        FROM fact_daily fd
        JOIN users u ON u.id = fd.user_id
        WHERE u.manager_id = $1 AND fd.date BETWEEN $2 AND $3
        GROUP BY u.id, u.name
        HAVING COALESCE(SUM(fd.{col}), 0) < $4",
        col = metric.as_sql()
    );

    let rows = client
        .timed_query_cached(
            &sql,
            &[&manager_id, &window.start, &window.end, &cutoff],
            "fact_daily.totals_below",
        )
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| MetricTotalRow {
            user_id: row.get("user_id"),
            name: row.get("name"),
            total: row.get("total"),
        })
        .collect())
}

/// The #1 user by window total on `metric`, if anyone has rows at all.
#[instrument(skip(pool, window))]
pub async fn fetch_top_rank(
    pool: &PgPool,
    manager_id: i64,
    metric: MetricColumn,
    window: &Window,
) -> Result<Option<MetricTotalRow>, FactQueryError> {
    let client = pool.get().await?;

    let sql = format!(
        "SELECT u.id AS user_id,
                u.name AS name,
                COALESCE(SUM(fd.{col}), 0)::float8 AS total
        FROM fact_daily fd
        JOIN users u ON u.id = fd.user_id
        WHERE u.manager_id = $1 AND fd.date BETWEEN $2 AND $3
        GROUP BY u.id, u.name
        ORDER BY total DESC, u.id ASC
        LIMIT 1",
        col = metric.as_sql()
    );

    let rows = client
        .timed_query_cached(
            &sql,
            &[&manager_id, &window.start, &window.end],
            "fact_daily.top_rank",
        )
        .await?;

    Ok(rows.into_iter().next().map(|row| MetricTotalRow {
        user_id: row.get("user_id"),
        name: row.get("name"),
        total: row.get("total"),
    }))
}

/// Every manager id with at least one direct report, for batch runs that do
/// not name managers explicitly.
#[instrument(skip(pool))]
pub async fn fetch_manager_ids(pool: &PgPool) -> Result<Vec<i64>, FactQueryError> {
    let client = pool.get().await?;

    let rows = client
        .timed_query_cached(
            "SELECT DISTINCT u.manager_id
            FROM users u
            WHERE u.manager_id IS NOT NULL
            ORDER BY u.manager_id",
            &[],
            "users.manager_ids",
        )
        .await?;

    Ok(rows.into_iter().map(|row| row.get("manager_id")).collect())
}

/// Per-user average idle seconds per tracked day over the window.
#[instrument(skip(pool, window))]
pub async fn fetch_idle_avg(
    pool: &PgPool,
    manager_id: i64,
    window: &Window,
) -> Result<Vec<IdleAvgRow>, FactQueryError> {
    let client = pool.get().await?;

    let rows = client
        .timed_query_cached(
            "SELECT u.id AS user_id,
                    u.name AS name,
                    AVG(fd.idle_time_seconds)::float8 AS idle_avg_sec
            FROM fact_daily fd
            JOIN users u ON u.id = fd.user_id
            WHERE u.manager_id = $1 AND fd.date BETWEEN $2 AND $3
            GROUP BY u.id, u.name",
            &[&manager_id, &window.start, &window.end],
            "fact_daily.idle_avg",
        )
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| IdleAvgRow {
            user_id: row.get("user_id"),
            name: row.get("name"),
            idle_avg_sec: row.get::<_, Option<f64>>("idle_avg_sec").unwrap_or(0.0),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cur: f64, prev: f64) -> MetricPairRow {
        MetricPairRow {
            user_id: 1,
            name: "Dana".into(),
            cur_val: cur,
            prev_val: prev,
        }
    }

    #[test]
    fn delta_is_none_below_baseline() {
        assert_eq!(row(120.0, 3.0).delta_pct(50.0), None);
        assert_eq!(row(0.0, 0.0).delta_pct(5.0), None);
    }

    #[test]
    fn delta_computed_at_or_above_baseline() {
        let dp = row(120.0, 60.0).delta_pct(50.0);
        assert_eq!(dp, Some(1.0));

        let dp = row(45.0, 60.0).delta_pct(50.0);
        assert!((dp.unwrap() - (-0.25)).abs() < 1e-9);
    }

    #[test]
    fn metric_columns_render_expected_sql() {
        assert_eq!(MetricColumn::Outbounds.as_sql(), "outbounds");
        assert_eq!(MetricColumn::AdvisorProMinutes.as_sql(), "advisor_pro_minutes");
        assert_eq!(MetricColumn::IdleTimeSeconds.as_sql(), "idle_time_seconds");
    }
}
