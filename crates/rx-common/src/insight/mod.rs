//! The insight pipeline: windowed candidate generation, trimming, oracle
//! selection, cap enforcement, and orchestration.

pub mod config;
pub mod message;
pub mod oracle;
pub mod pipeline;
pub mod polish;
pub mod rules;
pub mod trim;
pub mod windows;

pub use config::InsightConfig;
pub use message::prettify_message;
pub use oracle::{RankerClient, RankerConfig, RankerError, SelectionOracle};
pub use pipeline::{InsightEngine, InsightRunError, ManagerRunSummary, WindowOutcome};
pub use polish::enforce_caps;
pub use rules::{generate_candidates, WindowFacts};
pub use trim::{split_and_trim, CandidatePools};
pub use windows::{build_windows, default_anchor, Window, OVERALL_LABEL};
