//! Final-pick selection: ranking service with deterministic fallback.
//!
//! The ranking service sees both trimmed pools as compact feature records and
//! answers with candidate identifiers. Anything short of a well-formed,
//! complete response is a total failure; the caller falls back to severity
//! order so a flaky service can never sink a manager's run.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::Candidate;
use crate::insight::trim::sort_by_severity_desc;

#[derive(Debug, thiserror::Error)]
pub enum RankerError {
    #[error("ranking service transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ranking service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed ranking response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct RankerConfig {
    pub enabled: bool,
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl RankerConfig {
    pub fn from_env() -> Self {
        fn provider_defaults(provider: &str) -> (String, String) {
            match provider.to_ascii_lowercase().as_str() {
                "mistral" => (
                    "mistral-large-latest".into(),
                    "https://api.mistral.ai/v1/chat/completions".into(),
                ),
                "deepseek" => (
                    "deepseek-chat".into(),
                    "https://api.deepseek.com/v1/chat/completions".into(),
                ),
                _ => (
                    "gpt-4o-mini".into(),
                    "https://api.openai.com/v1/chat/completions".into(),
                ),
            }
        }

        fn provider_api_key(provider: &str) -> Option<String> {
            match provider.to_ascii_lowercase().as_str() {
                "openai" => std::env::var("OPENAI_API_KEY").ok(),
                "mistral" => std::env::var("MISTRAL_API_KEY").ok(),
                "deepseek" => std::env::var("DEEPSEEK_API_KEY").ok(),
                _ => None,
            }
        }

        fn parse_bool(key: &str, default: bool) -> bool {
            match std::env::var(key) {
                Ok(val) => matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
                Err(_) => default,
            }
        }

        fn parse_u64(key: &str, default: u64) -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(default)
        }

        let provider = std::env::var("RX_RANKER_PROVIDER").unwrap_or_else(|_| "openai".into());
        let (default_model, default_endpoint) = provider_defaults(&provider);

        let api_key = std::env::var("RX_RANKER_API_KEY")
            .ok()
            .or_else(|| provider_api_key(&provider))
            .unwrap_or_default();

        Self {
            enabled: parse_bool("RX_RANKER_ENABLED", true),
            provider,
            model: std::env::var("RX_RANKER_MODEL").unwrap_or(default_model),
            endpoint: std::env::var("RX_RANKER_ENDPOINT").unwrap_or(default_endpoint),
            api_key,
            timeout_secs: parse_u64("RX_RANKER_TIMEOUT_SECONDS", 30),
        }
    }

    /// A ranker without a key can never succeed; treat it as disabled.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }
}

#[derive(Serialize)]
struct CandidateFeature<'a> {
    cid: String,
    user_id: i64,
    insight_type: &'a str,
    title: &'a str,
    message: &'a str,
    severity: f64,
    window: &'a str,
}

impl<'a> CandidateFeature<'a> {
    fn from_candidate(c: &'a Candidate) -> Self {
        Self {
            cid: c.cid(),
            user_id: c.user_id,
            insight_type: c.insight_type.as_str(),
            title: &c.title,
            message: &c.message,
            severity: c.severity_score,
            window: &c.window_label,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Both fields are required; a response missing either is a total failure,
/// never a partial success.
#[derive(Debug, Deserialize)]
struct RankerPicks {
    strength_cids: Vec<String>,
    weakness_cids: Vec<String>,
}

fn parse_picks(content: &str) -> Result<RankerPicks, RankerError> {
    serde_json::from_str(content).map_err(|err| RankerError::Malformed(err.to_string()))
}

/// Map returned cids back onto the input pool, preserving service order.
/// Identifiers that are not in the pool, carry the wrong polarity prefix, or
/// repeat are discarded.
fn resolve_cids(cids: &[String], pool: &[Candidate], prefix: &str) -> Vec<Candidate> {
    let by_cid: HashMap<String, &Candidate> = pool.iter().map(|c| (c.cid(), c)).collect();
    let mut seen = HashSet::new();

    cids.iter()
        .filter(|cid| cid.starts_with(prefix))
        .filter(|cid| seen.insert((*cid).clone()))
        .filter_map(|cid| by_cid.get(cid).map(|c| (*c).clone()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct RankerClient {
    config: RankerConfig,
    http: reqwest::Client,
}

impl RankerClient {
    pub fn new(config: RankerConfig) -> Result<Self, RankerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    fn instruction(window_label: &str, final_k: usize) -> String {
        format!(
            "You are selecting the best performance insights for a manager dashboard.\n\
             \n\
             Pick EXACTLY:\n\
             - {final_k} strengths\n\
             - {final_k} weaknesses\n\
             for this window: {window_label}\n\
             \n\
             Rules:\n\
             - Avoid redundancy (do not pick two that say the same thing).\n\
             - Prefer behavioral insights over generic top_* callouts unless top_* is clearly best.\n\
             - Severity matters, but use common sense.\n\
             - If something looks like a return-from-PTO artifact, skip it.\n\
             \n\
             Return STRICT JSON ONLY:\n\
             {{\"strength_cids\": [\"...\"], \"weakness_cids\": [\"...\"]}}"
        )
    }

    /// One bounded, synchronous-in-spirit call per window. No retries: on any
    /// failure the caller falls back to severity order immediately.
    pub async fn rank(
        &self,
        strengths: &[Candidate],
        weaknesses: &[Candidate],
        window_label: &str,
        final_k: usize,
    ) -> Result<(Vec<Candidate>, Vec<Candidate>), RankerError> {
        let payload = json!({
            "strength_candidates": strengths
                .iter()
                .map(CandidateFeature::from_candidate)
                .collect::<Vec<_>>(),
            "weakness_candidates": weaknesses
                .iter()
                .map(CandidateFeature::from_candidate)
                .collect::<Vec<_>>(),
        });

        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": Self::instruction(window_label, final_k) },
                { "role": "user", "content": payload.to_string() },
            ],
            "temperature": 0.2,
            "max_tokens": 400,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RankerError::Status(response.status()));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| RankerError::Malformed("empty message content".into()))?;

        let picks = parse_picks(content)?;

        Ok((
            resolve_cids(&picks.strength_cids, strengths, "strength|"),
            resolve_cids(&picks.weakness_cids, weaknesses, "weakness|"),
        ))
    }
}

/// Deterministic strategy: severity descending, top k.
pub fn severity_top(pool: &[Candidate], k: usize) -> Vec<Candidate> {
    let mut sorted = pool.to_vec();
    sort_by_severity_desc(&mut sorted);
    sorted.truncate(k);
    sorted
}

fn fill_missing_slots(picked: &mut Vec<Candidate>, pool: &[Candidate], k: usize) {
    if picked.len() >= k {
        picked.truncate(k);
        return;
    }

    let taken: HashSet<String> = picked.iter().map(|c| c.cid()).collect();
    let mut refill: Vec<Candidate> = pool
        .iter()
        .filter(|c| !taken.contains(&c.cid()))
        .cloned()
        .collect();
    sort_by_severity_desc(&mut refill);

    for candidate in refill {
        if picked.len() >= k {
            break;
        }
        picked.push(candidate);
    }
}

/// The two interchangeable strategies of §ranking: a service-backed ranker
/// and the severity sort it degrades to.
#[derive(Debug, Clone)]
pub enum SelectionOracle {
    Severity,
    Ranker(RankerClient),
}

impl SelectionOracle {
    /// Build from the `RX_RANKER_*` environment. Disabled, keyless, or
    /// unbuildable configs degrade to the deterministic strategy.
    pub fn from_env() -> Self {
        let config = RankerConfig::from_env();
        if !config.is_usable() {
            return SelectionOracle::Severity;
        }
        match RankerClient::new(config) {
            Ok(client) => SelectionOracle::Ranker(client),
            Err(err) => {
                warn!(error = %err, "failed to build ranker client; using severity order");
                SelectionOracle::Severity
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionOracle::Severity => "severity",
            SelectionOracle::Ranker(_) => "ranker",
        }
    }

    /// Pick (up to) `final_k` per polarity from the trimmed pools. Service
    /// failures and short answers degrade per-slot: whatever the ranker did
    /// not fill comes from the pools in severity order. The result is only
    /// ever shorter than `final_k` when the pool itself is.
    pub async fn select(
        &self,
        strengths: &[Candidate],
        weaknesses: &[Candidate],
        window_label: &str,
        final_k: usize,
    ) -> (Vec<Candidate>, Vec<Candidate>) {
        let (mut picked_strengths, mut picked_weaknesses) = match self {
            SelectionOracle::Severity => (
                severity_top(strengths, final_k),
                severity_top(weaknesses, final_k),
            ),
            SelectionOracle::Ranker(client) => {
                match client.rank(strengths, weaknesses, window_label, final_k).await {
                    Ok(picks) => picks,
                    Err(err) => {
                        warn!(
                            error = %err,
                            window = window_label,
                            "ranking service failed; falling back to severity order"
                        );
                        (
                            severity_top(strengths, final_k),
                            severity_top(weaknesses, final_k),
                        )
                    }
                }
            }
        };

        fill_missing_slots(&mut picked_strengths, strengths, final_k);
        fill_missing_slots(&mut picked_weaknesses, weaknesses, final_k);

        (picked_strengths, picked_weaknesses)
    }
}
