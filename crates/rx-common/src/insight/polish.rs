//! Final cap enforcement over an oracle selection.
//!
//! Two caps apply: at most `top_cap` rank-class insights (never relaxed) and
//! at most `max_per_user` insights per distinct user (relaxed only when the
//! pool leaves no alternative). The output is exactly `final_k` items unless
//! the pool itself is smaller; short pools are returned as-is, never padded.

use std::collections::{HashMap, HashSet};

use crate::insight::trim::sort_by_severity_desc;
use crate::Candidate;

struct CapTracker {
    final_k: usize,
    top_cap: usize,
    max_per_user: usize,
    picked: Vec<Candidate>,
    picked_cids: HashSet<String>,
    user_counts: HashMap<i64, usize>,
    top_count: usize,
}

impl CapTracker {
    fn new(final_k: usize, top_cap: usize, max_per_user: usize) -> Self {
        Self {
            final_k,
            top_cap,
            max_per_user,
            picked: Vec::new(),
            picked_cids: HashSet::new(),
            user_counts: HashMap::new(),
            top_count: 0,
        }
    }

    fn full(&self) -> bool {
        self.picked.len() >= self.final_k
    }

    fn already_picked(&self, candidate: &Candidate) -> bool {
        self.picked_cids.contains(&candidate.cid())
    }

    fn can_pick(&self, candidate: &Candidate, honor_user_cap: bool) -> bool {
        if candidate.insight_type.is_rank_class() && self.top_count >= self.top_cap {
            return false;
        }
        if honor_user_cap {
            let used = self
                .user_counts
                .get(&candidate.user_id)
                .copied()
                .unwrap_or(0);
            if used >= self.max_per_user {
                return false;
            }
        }
        true
    }

    fn pick(&mut self, candidate: &Candidate) {
        self.picked_cids.insert(candidate.cid());
        *self.user_counts.entry(candidate.user_id).or_insert(0) += 1;
        if candidate.insight_type.is_rank_class() {
            self.top_count += 1;
        }
        self.picked.push(candidate.clone());
    }
}

/// Rewrite `items` into a cap-satisfying selection of (up to) `final_k`,
/// refilling from `refill_pool` by severity. Pass order:
/// 1. incoming items that satisfy both caps;
/// 2. pool refill honoring both caps; an unrepresented user always beats
///    relaxing the cap;
/// 3. last resort: pool refill ignoring the user cap, type cap still firm.
pub fn enforce_caps(
    items: Vec<Candidate>,
    refill_pool: &[Candidate],
    final_k: usize,
    top_cap: usize,
    max_per_user: usize,
) -> Vec<Candidate> {
    let mut items = items;
    sort_by_severity_desc(&mut items);

    let mut pool: Vec<Candidate> = refill_pool.to_vec();
    sort_by_severity_desc(&mut pool);

    let mut tracker = CapTracker::new(final_k, top_cap, max_per_user);

    for candidate in &items {
        if tracker.full() {
            break;
        }
        if tracker.already_picked(candidate) {
            continue;
        }
        if tracker.can_pick(candidate, true) {
            tracker.pick(candidate);
        }
    }

    for candidate in &pool {
        if tracker.full() {
            break;
        }
        if tracker.already_picked(candidate) {
            continue;
        }
        if tracker.can_pick(candidate, true) {
            tracker.pick(candidate);
        }
    }

    if !tracker.full() {
        for candidate in &pool {
            if tracker.full() {
                break;
            }
            if tracker.already_picked(candidate) {
                continue;
            }
            if tracker.can_pick(candidate, false) {
                tracker.pick(candidate);
            }
        }
    }

    tracker.picked.truncate(final_k);
    tracker.picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InsightType, Polarity};
    use chrono::NaiveDate;

    fn candidate(user_id: i64, insight_type: InsightType, severity: f64) -> Candidate {
        Candidate {
            manager_id: 1,
            user_id,
            insight_type,
            polarity: Polarity::Strength,
            title: "t".into(),
            message: "m".into(),
            metrics: serde_json::json!({}),
            severity_score: severity,
            window_label: "last_7_days".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 8, 18).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        }
    }

    #[test]
    fn keeps_at_most_one_rank_class_insight() {
        let items = vec![
            candidate(1, InsightType::TopOutbounds, 1.1),
            candidate(2, InsightType::TopQuoter, 1.1),
            candidate(3, InsightType::OutboundsUp, 0.9),
        ];

        let picked = enforce_caps(items, &[], 3, 1, 1);

        let rank_count = picked
            .iter()
            .filter(|c| c.insight_type.is_rank_class())
            .count();
        assert_eq!(rank_count, 1);
        assert_eq!(picked.len(), 2); // nothing to refill from
    }

    #[test]
    fn type_cap_holds_even_during_last_resort_refill() {
        let items = vec![candidate(1, InsightType::TopOutbounds, 2.0)];
        let pool = vec![
            candidate(1, InsightType::TopOutbounds, 2.0),
            candidate(1, InsightType::TopQuoter, 1.9),
            candidate(1, InsightType::OutboundsUp, 1.0),
            candidate(1, InsightType::QuotesUp, 0.8),
        ];

        let picked = enforce_caps(items, &pool, 3, 1, 1);

        assert_eq!(picked.len(), 3);
        let rank_count = picked
            .iter()
            .filter(|c| c.insight_type.is_rank_class())
            .count();
        assert_eq!(rank_count, 1);
    }

    #[test]
    fn spreads_across_users_before_relaxing_the_user_cap() {
        // Oracle returned only two valid picks; the third slot should go to
        // the unrepresented user even though user 1 has a stronger leftover.
        let items = vec![
            candidate(1, InsightType::OutboundsUp, 3.0),
            candidate(2, InsightType::QuotesUp, 2.5),
        ];
        let pool = vec![
            candidate(1, InsightType::OutboundsUp, 3.0),
            candidate(2, InsightType::QuotesUp, 2.5),
            candidate(1, InsightType::ObTimeUp, 2.4),
            candidate(3, InsightType::InboundsUp, 1.2),
        ];

        let picked = enforce_caps(items, &pool, 3, 1, 1);

        assert_eq!(picked.len(), 3);
        assert_eq!(picked[2].user_id, 3);
    }

    #[test]
    fn relaxes_user_cap_only_when_pool_offers_no_alternative() {
        let items = vec![candidate(1, InsightType::OutboundsUp, 3.0)];
        let pool = vec![
            candidate(1, InsightType::OutboundsUp, 3.0),
            candidate(1, InsightType::QuotesUp, 2.0),
            candidate(1, InsightType::InboundsUp, 1.5),
        ];

        let picked = enforce_caps(items, &pool, 3, 1, 1);

        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|c| c.user_id == 1));
        // Highest-severity leftovers first once the cap is relaxed.
        assert!((picked[1].severity_score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn short_pools_are_never_padded() {
        let items = vec![candidate(1, InsightType::OutboundsUp, 1.0)];
        let picked = enforce_caps(items, &[], 3, 1, 1);
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn exact_count_when_population_allows() {
        let pool: Vec<Candidate> = (1..=6)
            .map(|u| candidate(u, InsightType::OutboundsUp, u as f64))
            .collect();

        let picked = enforce_caps(Vec::new(), &pool, 3, 1, 1);

        assert_eq!(picked.len(), 3);
        // Refill picks by severity.
        assert_eq!(picked[0].user_id, 6);
        assert_eq!(picked[1].user_id, 5);
        assert_eq!(picked[2].user_id, 4);
    }
}
