use chrono::NaiveDate;
use deadpool_postgres::PoolError;
use tokio_postgres::Error as PgError;
use tracing::instrument;

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::insight::message::prettify_message;
use crate::insight::windows::OVERALL_LABEL;
use crate::{Candidate, Selection};

#[derive(Debug, thiserror::Error)]
pub enum SelectionStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
}

/// Storage key for one persisted selection. The `overall` window is keyed by
/// (manager_id, window_label) alone; trailing windows include the date range
/// so historical backfills for other ranges are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionKey {
    pub manager_id: i64,
    pub window_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

const INSERT_SQL: &str = "INSERT INTO rx.dashboard_insights (
        manager_id,
        window_label,
        polarity,
        user_id,
        insight_type,
        title,
        message,
        severity_score,
        start_date,
        end_date
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";

/// Overwrite the stored selection for `key`: delete every existing row for
/// that exact key, then insert the new rows, all in one transaction. A crash
/// mid-write never leaves a union of old and new rows visible to readers.
#[instrument(skip(pool, selection), fields(manager_id = key.manager_id, window = %key.window_label))]
pub async fn replace_selection(
    pool: &PgPool,
    key: &SelectionKey,
    selection: &Selection,
) -> Result<u64, SelectionStorageError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    if key.window_label == OVERALL_LABEL {
        tx.timed_execute_cached(
            "DELETE FROM rx.dashboard_insights
             WHERE manager_id = $1 AND window_label = $2",
            &[&key.manager_id, &key.window_label],
            "dashboard_insights.delete_overall",
        )
        .await?;
    } else {
        tx.timed_execute_cached(
            "DELETE FROM rx.dashboard_insights
             WHERE manager_id = $1 AND window_label = $2
               AND start_date = $3 AND end_date = $4",
            &[
                &key.manager_id,
                &key.window_label,
                &key.start_date,
                &key.end_date,
            ],
            "dashboard_insights.delete_window",
        )
        .await?;
    }

    let mut inserted = 0u64;
    for candidate in selection
        .strengths
        .iter()
        .chain(selection.weaknesses.iter())
    {
        inserted += insert_row(&tx, key, candidate).await?;
    }

    tx.commit().await?;
    Ok(inserted)
}

async fn insert_row(
    tx: &deadpool_postgres::Transaction<'_>,
    key: &SelectionKey,
    candidate: &Candidate,
) -> Result<u64, PgError> {
    // Overall rows keep their source window's wording; the candidate carries
    // the label of the window it was actually generated for.
    let message = prettify_message(&candidate.message, &candidate.window_label);

    tx.timed_execute_cached(
        INSERT_SQL,
        &[
            &key.manager_id,
            &key.window_label,
            &candidate.polarity.as_str(),
            &candidate.user_id,
            &candidate.insight_type.as_str(),
            &candidate.title,
            &message,
            &candidate.severity_score,
            &key.start_date,
            &key.end_date,
        ],
        "dashboard_insights.insert",
    )
    .await
}
