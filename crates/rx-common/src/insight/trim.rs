use crate::insight::config::InsightConfig;
use crate::{Candidate, Polarity};

/// Candidate pools for one selection pass. Refill draws from the trimmed
/// pools; the weakness rescue draws from the full untrimmed weakness pool.
#[derive(Debug, Clone, Default)]
pub struct CandidatePools {
    pub trimmed_strengths: Vec<Candidate>,
    pub trimmed_weaknesses: Vec<Candidate>,
    pub all_strengths: Vec<Candidate>,
    pub all_weaknesses: Vec<Candidate>,
}

/// Severity descending, cid ascending on ties, so every downstream pass sees
/// the same order for the same inputs.
pub fn sort_by_severity_desc(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.severity_score
            .partial_cmp(&a.severity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cid().cmp(&b.cid()))
    });
}

/// Split by polarity and keep the top T per side to bound ranking cost. The
/// full pools are returned alongside for the weakness rescue.
pub fn split_and_trim(candidates: Vec<Candidate>, cfg: &InsightConfig) -> CandidatePools {
    let mut all_strengths = Vec::new();
    let mut all_weaknesses = Vec::new();

    for candidate in candidates {
        match candidate.polarity {
            Polarity::Strength => all_strengths.push(candidate),
            Polarity::Weakness => all_weaknesses.push(candidate),
        }
    }

    sort_by_severity_desc(&mut all_strengths);
    sort_by_severity_desc(&mut all_weaknesses);

    let t = cfg.target_candidates_per_polarity;
    let trimmed_strengths = all_strengths.iter().take(t).cloned().collect();
    let trimmed_weaknesses = all_weaknesses.iter().take(t).cloned().collect();

    CandidatePools {
        trimmed_strengths,
        trimmed_weaknesses,
        all_strengths,
        all_weaknesses,
    }
}
