//! Candidate generation rules.
//!
//! Every rule is a pure function of pre-fetched per-user rows and the window;
//! no SQL, no wall clock, no randomness. Thresholds, baselines, and severity
//! weights are shipped product numbers; they shape ranking outcomes, so
//! changing them is a product decision, not a refactor.

use std::collections::HashMap;

use serde_json::json;

use crate::db::fact_daily::{ActiveDaysRow, IdleAvgRow, MetricPairRow, MetricTotalRow};
use crate::insight::config::InsightConfig;
use crate::insight::windows::{absence_tolerance, Window};
use crate::{Candidate, InsightType, Polarity};

/// Absolute floor for the low-quotes rule.
pub const LOW_QUOTES_CUTOFF: f64 = 15.0;
/// Low-quotes totals are meaningless for very short windows.
pub const LOW_QUOTES_MIN_WINDOW_DAYS: i64 = 5;
const LOW_QUOTES_SEVERITY: f64 = 1.7;

/// 1.5 h/day idle scores severity 1.0; 3.0 h scores 2.0, and so on.
const IDLE_HIGH_HOURS_FLOOR: f64 = 1.5;
const IDLE_IMPROVED_THRESHOLD: f64 = -0.20;
const IDLE_IMPROVED_MIN_PREV: f64 = 5.0;
const IDLE_IMPROVED_WEIGHT: f64 = 1.4;

/// Rank-class callouts are team-level color, not personal deltas; they get a
/// flat severity below most meaningful behavioral swings.
const RANK_SEVERITY: f64 = 1.1;

/// Minimum previous-period baseline for a delta rule. AdvisorPro scales with
/// window length (1.5 h / 3 h / 6 h of tracked time); everything else is a
/// fixed count.
#[derive(Debug, Clone, Copy)]
enum Baseline {
    Fixed(f64),
    AdvisorMinutes,
}

impl Baseline {
    fn min_prev(&self, window_days: i64) -> f64 {
        match self {
            Baseline::Fixed(v) => *v,
            Baseline::AdvisorMinutes => match window_days {
                7 => 90.0,
                14 => 180.0,
                30 => 360.0,
                _ => 90.0,
            },
        }
    }
}

struct DeltaRule {
    up_type: InsightType,
    down_type: InsightType,
    up_title: &'static str,
    down_title: &'static str,
    subject: &'static str,
    verb: &'static str,
    threshold: f64,
    baseline: Baseline,
    weight: f64,
    pct_decimals: usize,
}

const OUTBOUNDS_RULE: DeltaRule = DeltaRule {
    up_type: InsightType::OutboundsUp,
    down_type: InsightType::OutboundsDown,
    up_title: "Outbound calls up",
    down_title: "Outbound calls down",
    subject: "outbound calls",
    verb: "are",
    threshold: 0.15,
    baseline: Baseline::Fixed(50.0),
    weight: 2.0,
    pct_decimals: 0,
};

const INBOUNDS_RULE: DeltaRule = DeltaRule {
    up_type: InsightType::InboundsUp,
    down_type: InsightType::InboundsDown,
    up_title: "Inbound calls up",
    down_title: "Inbound calls down",
    subject: "inbound calls",
    verb: "are",
    threshold: 0.15,
    baseline: Baseline::Fixed(20.0),
    weight: 1.8,
    pct_decimals: 0,
};

const QUOTES_RULE: DeltaRule = DeltaRule {
    up_type: InsightType::QuotesUp,
    down_type: InsightType::QuotesDown,
    up_title: "Quotes up",
    down_title: "Quotes down",
    subject: "unique quotes",
    verb: "are",
    threshold: 0.12,
    baseline: Baseline::Fixed(10.0),
    weight: 2.2,
    pct_decimals: 0,
};

const OB_TIME_RULE: DeltaRule = DeltaRule {
    up_type: InsightType::ObTimeUp,
    down_type: InsightType::ObTimeDown,
    up_title: "Outbound talk time up",
    down_title: "Outbound talk time down",
    subject: "outbound talk time",
    verb: "is",
    threshold: 0.10,
    baseline: Baseline::Fixed(30.0),
    weight: 2.0,
    pct_decimals: 1,
};

const ADVISOR_PRO_RULE: DeltaRule = DeltaRule {
    up_type: InsightType::AdvisorProUp,
    down_type: InsightType::AdvisorProDown,
    up_title: "AdvisorPro usage up",
    down_title: "AdvisorPro usage down",
    subject: "AdvisorPro time",
    verb: "is",
    threshold: 0.10,
    baseline: Baseline::AdvisorMinutes,
    weight: 1.6,
    pct_decimals: 1,
};

/// Pre-fetched aggregator output for one (manager, window).
#[derive(Debug, Clone, Default)]
pub struct WindowFacts {
    pub outbounds: Vec<MetricPairRow>,
    pub inbounds: Vec<MetricPairRow>,
    pub quotes: Vec<MetricPairRow>,
    pub ob_time: Vec<MetricPairRow>,
    pub advisor_pro: Vec<MetricPairRow>,
    pub idle_delta: Vec<MetricPairRow>,
    pub idle_avg: Vec<IdleAvgRow>,
    pub low_quotes: Vec<MetricTotalRow>,
    pub top_outbounds: Option<MetricTotalRow>,
    pub top_quoter: Option<MetricTotalRow>,
    pub active_days: HashMap<i64, ActiveDaysRow>,
}

fn pct(dp: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, dp.abs() * 100.0)
}

fn clamped_severity(dp: f64, weight: f64, cfg: &InsightConfig) -> f64 {
    let clamped = dp.clamp(
        -cfg.max_abs_delta_for_severity,
        cfg.max_abs_delta_for_severity,
    );
    clamped.abs() * weight
}

/// PTO/absence guard: suppress the delta when too many prior-period days had
/// no tracked signal at all. A week off halves most prev totals and the
/// "recovery" delta would read as a breakout.
fn absence_guard_passes(
    active_days: &HashMap<i64, ActiveDaysRow>,
    user_id: i64,
    window: &Window,
) -> bool {
    let tolerance = absence_tolerance(&window.label);
    let prev_active = active_days
        .get(&user_id)
        .map(|r| r.prev_active_days)
        .unwrap_or(0);
    let prev_inactive = (window.len_days() - prev_active).max(0);
    prev_inactive <= tolerance
}

fn make_candidate(
    manager_id: i64,
    window: &Window,
    user_id: i64,
    insight_type: InsightType,
    polarity: Polarity,
    title: &str,
    message: String,
    metrics: serde_json::Value,
    severity: f64,
) -> Candidate {
    Candidate {
        manager_id,
        user_id,
        insight_type,
        polarity,
        title: title.to_string(),
        message,
        metrics,
        severity_score: severity,
        window_label: window.label.clone(),
        start_date: window.start,
        end_date: window.end,
    }
}

fn apply_delta_rule(
    rule: &DeltaRule,
    rows: &[MetricPairRow],
    active_days: &HashMap<i64, ActiveDaysRow>,
    manager_id: i64,
    window: &Window,
    cfg: &InsightConfig,
    out: &mut Vec<Candidate>,
) {
    let min_prev = rule.baseline.min_prev(window.len_days());

    for row in rows {
        let Some(dp) = row.delta_pct(min_prev) else {
            continue;
        };
        if !absence_guard_passes(active_days, row.user_id, window) {
            continue;
        }

        let severity = clamped_severity(dp, rule.weight, cfg);
        let metrics = json!({
            "cur": row.cur_val,
            "prev": row.prev_val,
            "delta_pct": dp,
        });

        if dp >= rule.threshold {
            out.push(make_candidate(
                manager_id,
                window,
                row.user_id,
                rule.up_type,
                Polarity::Strength,
                rule.up_title,
                format!(
                    "{} {} {} up {} ({}).",
                    row.name,
                    rule.subject,
                    rule.verb,
                    pct(dp, rule.pct_decimals),
                    window.label
                ),
                metrics,
                severity,
            ));
        } else if dp <= -rule.threshold {
            out.push(make_candidate(
                manager_id,
                window,
                row.user_id,
                rule.down_type,
                Polarity::Weakness,
                rule.down_title,
                format!(
                    "{} {} {} down {} ({}).",
                    row.name,
                    rule.subject,
                    rule.verb,
                    pct(dp, rule.pct_decimals),
                    window.label
                ),
                metrics,
                severity,
            ));
        }
    }
}

fn apply_idle_improved(
    rows: &[MetricPairRow],
    active_days: &HashMap<i64, ActiveDaysRow>,
    manager_id: i64,
    window: &Window,
    cfg: &InsightConfig,
    out: &mut Vec<Candidate>,
) {
    for row in rows {
        let Some(dp) = row.delta_pct(IDLE_IMPROVED_MIN_PREV) else {
            continue;
        };
        if dp > IDLE_IMPROVED_THRESHOLD {
            continue;
        }
        if !absence_guard_passes(active_days, row.user_id, window) {
            continue;
        }

        let severity = clamped_severity(dp, IDLE_IMPROVED_WEIGHT, cfg);
        out.push(make_candidate(
            manager_id,
            window,
            row.user_id,
            InsightType::IdleImproved,
            Polarity::Strength,
            "Idle Time Improved",
            format!(
                "{} idle time improved {} ({}).",
                row.name,
                pct(dp, 0),
                window.label
            ),
            json!({
                "cur": row.cur_val,
                "prev": row.prev_val,
                "delta_pct": dp,
            }),
            severity,
        ));
    }
}

fn apply_idle_high(
    rows: &[IdleAvgRow],
    manager_id: i64,
    window: &Window,
    out: &mut Vec<Candidate>,
) {
    for row in rows {
        let idle_hours = row.idle_avg_sec / 3600.0;
        if idle_hours < IDLE_HIGH_HOURS_FLOOR {
            continue;
        }

        out.push(make_candidate(
            manager_id,
            window,
            row.user_id,
            InsightType::IdleHigh,
            Polarity::Weakness,
            "High Idle Time",
            format!(
                "{} averaged {:.1} idle hrs/day ({}).",
                row.name, idle_hours, window.label
            ),
            json!({
                "idle_avg_hours": idle_hours,
                "idle_avg_sec": row.idle_avg_sec,
            }),
            idle_hours / IDLE_HIGH_HOURS_FLOOR,
        ));
    }
}

fn apply_low_quotes(
    rows: &[MetricTotalRow],
    manager_id: i64,
    window: &Window,
    out: &mut Vec<Candidate>,
) {
    if window.len_days() < LOW_QUOTES_MIN_WINDOW_DAYS {
        return;
    }

    for row in rows {
        out.push(make_candidate(
            manager_id,
            window,
            row.user_id,
            InsightType::QuotesLowAbs,
            Polarity::Weakness,
            "Low Quotes",
            format!(
                "{} only has {:.0} unique quotes ({}).",
                row.name, row.total, window.label
            ),
            json!({ "quotes_total": row.total }),
            LOW_QUOTES_SEVERITY,
        ));
    }
}

fn apply_rank_rules(
    facts: &WindowFacts,
    manager_id: i64,
    window: &Window,
    out: &mut Vec<Candidate>,
) {
    if let Some(top) = &facts.top_outbounds {
        out.push(make_candidate(
            manager_id,
            window,
            top.user_id,
            InsightType::TopOutbounds,
            Polarity::Strength,
            "Top Outbound Producer",
            format!(
                "{} led outbounds with {:.0} calls ({}).",
                top.name, top.total, window.label
            ),
            json!({ "outbounds_total": top.total }),
            RANK_SEVERITY,
        ));
    }

    if let Some(top) = &facts.top_quoter {
        out.push(make_candidate(
            manager_id,
            window,
            top.user_id,
            InsightType::TopQuoter,
            Polarity::Strength,
            "Top Quoter",
            format!(
                "{} led quoting with {:.0} unique quotes ({}).",
                top.name, top.total, window.label
            ),
            json!({ "quotes_unique_total": top.total }),
            RANK_SEVERITY,
        ));
    }
}

/// Run the full rule set over one window's facts. Pure: same facts, same
/// output, in a deterministic order.
pub fn generate_candidates(
    manager_id: i64,
    window: &Window,
    facts: &WindowFacts,
    cfg: &InsightConfig,
) -> Vec<Candidate> {
    let mut out = Vec::new();

    apply_delta_rule(
        &OUTBOUNDS_RULE,
        &facts.outbounds,
        &facts.active_days,
        manager_id,
        window,
        cfg,
        &mut out,
    );
    apply_delta_rule(
        &INBOUNDS_RULE,
        &facts.inbounds,
        &facts.active_days,
        manager_id,
        window,
        cfg,
        &mut out,
    );
    apply_delta_rule(
        &QUOTES_RULE,
        &facts.quotes,
        &facts.active_days,
        manager_id,
        window,
        cfg,
        &mut out,
    );
    apply_low_quotes(&facts.low_quotes, manager_id, window, &mut out);
    apply_idle_high(&facts.idle_avg, manager_id, window, &mut out);
    apply_idle_improved(
        &facts.idle_delta,
        &facts.active_days,
        manager_id,
        window,
        cfg,
        &mut out,
    );
    apply_rank_rules(facts, manager_id, window, &mut out);
    apply_delta_rule(
        &OB_TIME_RULE,
        &facts.ob_time,
        &facts.active_days,
        manager_id,
        window,
        cfg,
        &mut out,
    );
    apply_delta_rule(
        &ADVISOR_PRO_RULE,
        &facts.advisor_pro,
        &facts.active_days,
        manager_id,
        window,
        cfg,
        &mut out,
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn week_window() -> Window {
        Window::new(
            "last_7_days",
            NaiveDate::from_ymd_opt(2026, 8, 18).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        )
    }

    fn pair(user_id: i64, cur: f64, prev: f64) -> MetricPairRow {
        MetricPairRow {
            user_id,
            name: format!("User {user_id}"),
            cur_val: cur,
            prev_val: prev,
        }
    }

    fn fully_active(user_ids: &[i64], days: i64) -> HashMap<i64, ActiveDaysRow> {
        user_ids
            .iter()
            .map(|&user_id| {
                (
                    user_id,
                    ActiveDaysRow {
                        user_id,
                        cur_active_days: days,
                        prev_active_days: days,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn outbounds_doubling_emits_strength_with_weighted_severity() {
        let facts = WindowFacts {
            outbounds: vec![pair(1, 120.0, 60.0)],
            active_days: fully_active(&[1], 7),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());

        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.insight_type, InsightType::OutboundsUp);
        assert_eq!(c.polarity, Polarity::Strength);
        // +100 % clamped within ±500 %, times the outbounds weight 2.0.
        assert!((c.severity_score - 2.0).abs() < 1e-9);
        assert!(c.message.contains("outbound calls are up 100%"));
        assert_eq!(c.metrics["delta_pct"], 1.0);
    }

    #[test]
    fn outbounds_below_baseline_is_silent_regardless_of_cur() {
        let facts = WindowFacts {
            outbounds: vec![pair(1, 120.0, 3.0)],
            active_days: fully_active(&[1], 7),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn absence_guard_suppresses_extreme_deltas() {
        let mut active = HashMap::new();
        // 3 active prior days in a 7-day window -> 4 inactive > tolerance 3.
        active.insert(
            1,
            ActiveDaysRow {
                user_id: 1,
                cur_active_days: 7,
                prev_active_days: 3,
            },
        );
        let facts = WindowFacts {
            outbounds: vec![pair(1, 600.0, 60.0)],
            active_days: active,
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn absence_guard_applies_to_every_delta_rule() {
        // User absent the whole prior week; only non-delta rules may fire.
        let facts = WindowFacts {
            outbounds: vec![pair(1, 600.0, 60.0)],
            inbounds: vec![pair(1, 200.0, 40.0)],
            quotes: vec![pair(1, 80.0, 20.0)],
            ob_time: vec![pair(1, 400.0, 100.0)],
            advisor_pro: vec![pair(1, 500.0, 100.0)],
            idle_delta: vec![pair(1, 10.0, 100.0)],
            active_days: HashMap::new(),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn severity_is_clamped_before_weighting() {
        let facts = WindowFacts {
            outbounds: vec![pair(1, 6600.0, 60.0)], // +10900 %
            active_days: fully_active(&[1], 7),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert_eq!(out.len(), 1);
        // clamp(109.0, 5.0) * 2.0
        assert!((out[0].severity_score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn symmetric_negative_threshold_emits_weakness() {
        let facts = WindowFacts {
            outbounds: vec![pair(1, 48.0, 60.0)], // -20 %
            active_days: fully_active(&[1], 7),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].insight_type, InsightType::OutboundsDown);
        assert_eq!(out[0].polarity, Polarity::Weakness);
        assert!(out[0].message.contains("down 20%"));
    }

    #[test]
    fn small_moves_inside_the_threshold_emit_nothing() {
        let facts = WindowFacts {
            outbounds: vec![pair(1, 66.0, 60.0)], // +10 % < 15 %
            active_days: fully_active(&[1], 7),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn quotes_rule_uses_its_own_threshold_and_weight() {
        let facts = WindowFacts {
            quotes: vec![pair(2, 28.0, 25.0), pair(3, 19.0, 25.0)], // +12 %, -24 %
            active_days: fully_active(&[2, 3], 7),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].insight_type, InsightType::QuotesUp);
        assert!((out[0].severity_score - 0.12 * 2.2).abs() < 1e-9);
        assert_eq!(out[1].insight_type, InsightType::QuotesDown);
    }

    #[test]
    fn advisor_baseline_scales_with_window_length() {
        let week_facts = WindowFacts {
            advisor_pro: vec![pair(1, 200.0, 100.0)],
            active_days: fully_active(&[1], 7),
            ..Default::default()
        };
        let out = generate_candidates(9, &week_window(), &week_facts, &InsightConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].insight_type, InsightType::AdvisorProUp);

        let fortnight = Window::new(
            "last_14_days",
            NaiveDate::from_ymd_opt(2026, 8, 11).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        );
        let fortnight_facts = WindowFacts {
            advisor_pro: vec![pair(1, 200.0, 100.0)], // prev under the 180-min baseline
            active_days: fully_active(&[1], 14),
            ..Default::default()
        };
        let out = generate_candidates(9, &fortnight, &fortnight_facts, &InsightConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn low_quotes_needs_a_long_enough_window() {
        let total = MetricTotalRow {
            user_id: 4,
            name: "User 4".into(),
            total: 8.0,
        };

        let facts = WindowFacts {
            low_quotes: vec![total.clone()],
            ..Default::default()
        };
        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].insight_type, InsightType::QuotesLowAbs);
        assert!((out[0].severity_score - 1.7).abs() < 1e-9);

        let short = Window::new(
            "last_3_days",
            NaiveDate::from_ymd_opt(2026, 8, 22).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        );
        let facts = WindowFacts {
            low_quotes: vec![total],
            ..Default::default()
        };
        let out = generate_candidates(9, &short, &facts, &InsightConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn idle_rules_fire_on_hours_and_improvement() {
        let facts = WindowFacts {
            idle_avg: vec![
                IdleAvgRow {
                    user_id: 5,
                    name: "User 5".into(),
                    idle_avg_sec: 3.0 * 3600.0,
                },
                IdleAvgRow {
                    user_id: 6,
                    name: "User 6".into(),
                    idle_avg_sec: 0.5 * 3600.0,
                },
            ],
            idle_delta: vec![pair(7, 30.0, 60.0)], // idle halved
            active_days: fully_active(&[5, 6, 7], 7),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert_eq!(out.len(), 2);

        let high = out
            .iter()
            .find(|c| c.insight_type == InsightType::IdleHigh)
            .unwrap();
        assert_eq!(high.polarity, Polarity::Weakness);
        assert!((high.severity_score - 2.0).abs() < 1e-9);

        let improved = out
            .iter()
            .find(|c| c.insight_type == InsightType::IdleImproved)
            .unwrap();
        assert_eq!(improved.polarity, Polarity::Strength);
        assert!((improved.severity_score - 0.5 * 1.4).abs() < 1e-9);
    }

    #[test]
    fn rank_rules_emit_flat_severity_team_callouts() {
        let facts = WindowFacts {
            top_outbounds: Some(MetricTotalRow {
                user_id: 8,
                name: "User 8".into(),
                total: 412.0,
            }),
            top_quoter: Some(MetricTotalRow {
                user_id: 9,
                name: "User 9".into(),
                total: 61.0,
            }),
            ..Default::default()
        };

        let out = generate_candidates(9, &week_window(), &facts, &InsightConfig::default());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.insight_type.is_rank_class()));
        assert!(out.iter().all(|c| c.polarity == Polarity::Strength));
        assert!(out.iter().all(|c| (c.severity_score - 1.1).abs() < 1e-9));
        assert!(out[0].message.contains("led outbounds with 412 calls"));
    }

    #[test]
    fn generation_is_deterministic() {
        let facts = WindowFacts {
            outbounds: vec![pair(1, 120.0, 60.0), pair(2, 40.0, 60.0)],
            quotes: vec![pair(1, 30.0, 20.0)],
            active_days: fully_active(&[1, 2], 7),
            ..Default::default()
        };
        let cfg = InsightConfig::default();

        let a = generate_candidates(9, &week_window(), &facts, &cfg);
        let b = generate_candidates(9, &week_window(), &facts, &cfg);
        assert_eq!(a, b);
    }
}
