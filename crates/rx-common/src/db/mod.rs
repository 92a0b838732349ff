pub mod candidate_log;
pub mod fact_daily;
pub mod migrations;
pub mod pool;
pub mod selections;
pub mod util;

// Keep re-exports unique so downstream crates see a single symbol per helper.
pub use candidate_log::{append_candidates, CandidateLogError};
pub use fact_daily::{
    fetch_active_days_pair, fetch_idle_avg, fetch_manager_ids, fetch_metric_pair, fetch_top_rank,
    fetch_totals_below,
    ActiveDaysRow, FactQueryError, IdleAvgRow, MetricColumn, MetricPairRow, MetricTotalRow,
};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool_from_url, DbPoolError, PgPool};
pub use selections::{replace_selection, SelectionKey, SelectionStorageError};
pub use util::TimedClientExt;
