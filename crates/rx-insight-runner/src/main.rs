use chrono::NaiveDate;
use clap::Parser;
use dotenvy::dotenv;
use metrics::counter;
use rx_common::db::{create_pool_from_url, fetch_manager_ids, run_migrations};
use rx_common::insight::{default_anchor, InsightConfig, InsightEngine, SelectionOracle};
use rx_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use rx_common::run_id;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "rx-insight-runner",
    about = "Generate and persist dashboard insights for managers"
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    db_url: String,

    /// Manager to process; repeatable. Omit to process every manager with
    /// direct reports.
    #[arg(long = "manager-id")]
    manager_ids: Vec<i64>,

    /// Anchor date (YYYY-MM-DD) for the trailing windows; defaults to
    /// yesterday so a partially ingested today never skews deltas.
    #[arg(long)]
    anchor: Option<NaiveDate>,

    /// Per-manager time budget in seconds; a manager over budget is skipped
    /// and the batch continues.
    #[arg(long, default_value_t = 300)]
    time_budget_secs: u64,

    /// Run idempotent schema migrations before processing
    #[arg(long, default_value_t = false)]
    init_schema: bool,
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));
    rx_metrics::init_metrics("RX_METRICS_PORT", rx_metrics::DEFAULT_METRICS_PORT);

    let args = Cli::parse();
    let pool = create_pool_from_url(&args.db_url)?;
    let status = pool.status();
    info!(
        size = status.size,
        available = status.available,
        run_id = run_id::get(),
        "created postgres connection pool for insight runner",
    );

    if args.init_schema {
        run_migrations(&pool).await?;
    }

    let manager_ids = if args.manager_ids.is_empty() {
        fetch_manager_ids(&pool).await?
    } else {
        args.manager_ids.clone()
    };
    if manager_ids.is_empty() {
        info!("no managers to process; exiting");
        return Ok(());
    }

    let anchor = args.anchor.unwrap_or_else(default_anchor);
    let oracle = SelectionOracle::from_env();
    info!(
        %anchor,
        managers = manager_ids.len(),
        oracle = oracle.name(),
        time_budget_secs = args.time_budget_secs,
        "starting insight batch",
    );

    let engine = InsightEngine::new(pool, oracle, InsightConfig::default());
    let budget = Duration::from_secs(args.time_budget_secs);

    for manager_id in manager_ids {
        let outcome = match args.anchor {
            Some(anchor) => timeout(budget, engine.run_for_manager_at(manager_id, anchor)).await,
            None => timeout(budget, engine.run_for_manager(manager_id)).await,
        };
        match outcome {
            Ok(Ok(summary)) => {
                counter!("rx_insight_runs_total", "status" => "ok").increment(1);
                counter!("rx_insight_candidates_total")
                    .increment(summary.total_candidates() as u64);
                info!(
                    manager_id,
                    run_id = %summary.run_id,
                    candidates = summary.total_candidates(),
                    overall_selected = summary.overall_selected,
                    "manager processed",
                );
            }
            Ok(Err(err)) => {
                counter!("rx_insight_runs_total", "status" => "error").increment(1);
                error!(manager_id, error = %err, "manager run failed; continuing batch");
            }
            Err(_) => {
                counter!("rx_insight_runs_total", "status" => "timeout").increment(1);
                warn!(
                    manager_id,
                    time_budget_secs = args.time_budget_secs,
                    "manager run exceeded time budget; skipping",
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("rx-insight-runner failed: {err}");
        std::process::exit(1);
    }
}
