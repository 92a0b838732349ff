/// Current dashboard picks, one row per selected insight.
///
/// Uniquely keyed by (manager_id, window_label, start_date, end_date) for the
/// trailing windows and by (manager_id, window_label) for `overall`; each run
/// deletes-then-inserts for its key, so no history accumulates here.
pub const DASHBOARD_INSIGHTS_DDL: &str = r#"
CREATE TABLE rx.dashboard_insights (
    id BIGSERIAL PRIMARY KEY,
    manager_id BIGINT NOT NULL,
    window_label VARCHAR(32) NOT NULL,
    polarity VARCHAR(10) NOT NULL,
    user_id BIGINT NOT NULL,
    insight_type VARCHAR(32) NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    severity_score DOUBLE PRECISION NOT NULL DEFAULT 0,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_di_polarity CHECK (polarity IN ('strength', 'weakness')),
    CONSTRAINT chk_di_severity CHECK (severity_score >= 0)
);

CREATE INDEX idx_dashboard_insights_lookup
    ON rx.dashboard_insights(manager_id, window_label);
CREATE INDEX idx_dashboard_insights_user
    ON rx.dashboard_insights(user_id, created_at DESC);
"#;

/// Append-only audit log of every generated candidate, keyed by run_id.
/// Never deleted by the pipeline; consumed by export/report tooling.
pub const INSIGHT_CANDIDATES_DDL: &str = r#"
CREATE TABLE rx.insight_candidates (
    id BIGSERIAL PRIMARY KEY,
    run_id VARCHAR(64) NOT NULL,
    manager_id BIGINT NOT NULL,
    window_label VARCHAR(32) NOT NULL,
    polarity VARCHAR(10) NOT NULL,
    user_id BIGINT NOT NULL,
    insight_type VARCHAR(32) NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    metrics JSONB,
    severity_score DOUBLE PRECISION NOT NULL DEFAULT 0,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_ic_polarity CHECK (polarity IN ('strength', 'weakness')),
    CONSTRAINT chk_ic_severity CHECK (severity_score >= 0)
);

CREATE INDEX idx_insight_candidates_run
    ON rx.insight_candidates(manager_id, run_id, window_label);
CREATE INDEX idx_insight_candidates_run_id
    ON rx.insight_candidates(run_id);
"#;
