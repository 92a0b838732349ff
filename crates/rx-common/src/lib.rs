pub mod db;
pub mod insight;
pub mod logging;
pub mod run_id;
pub mod schema;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether an insight is framed as something the team did well or something
/// that needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Strength,
    Weakness,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Strength => "strength",
            Polarity::Weakness => "weakness",
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every rule output type the generator can emit. The storage form is the
/// snake_case string from [`InsightType::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    OutboundsUp,
    OutboundsDown,
    InboundsUp,
    InboundsDown,
    QuotesUp,
    QuotesDown,
    QuotesLowAbs,
    IdleHigh,
    IdleImproved,
    ObTimeUp,
    ObTimeDown,
    AdvisorProUp,
    AdvisorProDown,
    TopOutbounds,
    TopQuoter,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::OutboundsUp => "outbounds_up",
            InsightType::OutboundsDown => "outbounds_down",
            InsightType::InboundsUp => "inbounds_up",
            InsightType::InboundsDown => "inbounds_down",
            InsightType::QuotesUp => "quotes_up",
            InsightType::QuotesDown => "quotes_down",
            InsightType::QuotesLowAbs => "quotes_low_abs",
            InsightType::IdleHigh => "idle_high",
            InsightType::IdleImproved => "idle_improved",
            InsightType::ObTimeUp => "ob_time_up",
            InsightType::ObTimeDown => "ob_time_down",
            InsightType::AdvisorProUp => "advisor_pro_up",
            InsightType::AdvisorProDown => "advisor_pro_down",
            InsightType::TopOutbounds => "top_outbounds",
            InsightType::TopQuoter => "top_quoter",
        }
    }

    /// Rank-class insights call out the #1 performer on a raw metric rather
    /// than a personalized behavioral delta. The final selection caps these.
    pub fn is_rank_class(&self) -> bool {
        matches!(self, InsightType::TopOutbounds | InsightType::TopQuoter)
    }
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated, unselected insight proposal. Created fresh every run and
/// never mutated after generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub manager_id: i64,
    pub user_id: i64,
    pub insight_type: InsightType,
    pub polarity: Polarity,
    pub title: String,
    pub message: String,
    pub metrics: Value,
    pub severity_score: f64,
    pub window_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Candidate {
    /// Stable identifier within a run, used to round-trip candidates through
    /// the ranking service and to deduplicate during refill.
    pub fn cid(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.polarity, self.user_id, self.insight_type, self.window_label
        )
    }
}

/// Final picks for one (manager, window): at most F per polarity after the
/// cap-enforcement pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub strengths: Vec<Candidate>,
    pub weaknesses: Vec<Candidate>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty() && self.weaknesses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strengths.len() + self.weaknesses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polarity_storage_form() {
        assert_eq!(Polarity::Strength.as_str(), "strength");
        assert_eq!(Polarity::Weakness.as_str(), "weakness");
    }

    #[test]
    fn rank_class_covers_only_top_types() {
        assert!(InsightType::TopOutbounds.is_rank_class());
        assert!(InsightType::TopQuoter.is_rank_class());
        assert!(!InsightType::OutboundsUp.is_rank_class());
        assert!(!InsightType::QuotesLowAbs.is_rank_class());
    }

    #[test]
    fn cid_embeds_polarity_user_type_and_window() {
        let c = Candidate {
            manager_id: 1,
            user_id: 42,
            insight_type: InsightType::OutboundsUp,
            polarity: Polarity::Strength,
            title: "Outbound calls up".into(),
            message: "msg".into(),
            metrics: serde_json::json!({}),
            severity_score: 2.0,
            window_label: "last_7_days".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 8, 18).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        };
        assert_eq!(c.cid(), "strength|42|outbounds_up|last_7_days");
    }
}
