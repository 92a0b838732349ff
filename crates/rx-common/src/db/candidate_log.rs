use deadpool_postgres::PoolError;
use tokio_postgres::types::Json;
use tokio_postgres::Error as PgError;
use tracing::instrument;

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::insight::message::prettify_message;
use crate::Candidate;

#[derive(Debug, thiserror::Error)]
pub enum CandidateLogError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
}

const INSERT_SQL: &str = "INSERT INTO rx.insight_candidates (
        run_id,
        manager_id,
        window_label,
        polarity,
        user_id,
        insight_type,
        title,
        message,
        metrics,
        severity_score,
        start_date,
        end_date
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

/// Append every generated candidate for one window to the audit log under
/// `run_id`. The log is append-only: nothing in the pipeline ever deletes
/// from it, so an export can reconstruct what each run saw before selection.
#[instrument(skip(pool, candidates), fields(count = candidates.len()))]
pub async fn append_candidates(
    pool: &PgPool,
    run_id: &str,
    candidates: &[Candidate],
) -> Result<u64, CandidateLogError> {
    if candidates.is_empty() {
        return Ok(0);
    }

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let mut inserted = 0u64;
    for c in candidates {
        let message = prettify_message(&c.message, &c.window_label);
        inserted += tx
            .timed_execute_cached(
                INSERT_SQL,
                &[
                    &run_id,
                    &c.manager_id,
                    &c.window_label,
                    &c.polarity.as_str(),
                    &c.user_id,
                    &c.insight_type.as_str(),
                    &c.title,
                    &message,
                    &Json(&c.metrics),
                    &c.severity_score,
                    &c.start_date,
                    &c.end_date,
                ],
                "insight_candidates.insert",
            )
            .await?;
    }

    tx.commit().await?;
    Ok(inserted)
}
