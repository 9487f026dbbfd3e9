//! Harness error taxonomy.
//!
//! Two tiers: [`HarnessError`] covers load-time and configuration failures
//! that abort a scenario or the run before any episode starts;
//! [`EpisodeError`] covers fatal per-episode conditions. Recoverable
//! conditions (parse failures, backend 4xx rejections) are data, not errors:
//! they flow back to the agent as corrective turns and never propagate.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    /// Dataset entry missing required fields; aborts that scenario only.
    #[error("malformed scenario {id}: {detail}")]
    MalformedScenario { id: String, detail: String },

    #[error("config error: {0}")]
    Config(String),
}

/// Fatal conditions contained at the episode boundary. One episode's fatal
/// error never aborts the run; the orchestrator decides between scoring 0.0
/// (backend unavailable) and excluding from the aggregate (model client).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EpisodeError {
    /// Record server unreachable after the bounded retry schedule.
    #[error("backend unavailable: {detail}")]
    BackendUnavailable { detail: String },

    /// The model client could not produce a next turn.
    #[error("model client failure: {detail}")]
    ModelClient { detail: String },
}

impl EpisodeError {
    pub fn backend_unavailable(detail: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            detail: detail.into(),
        }
    }

    pub fn model_client(detail: impl Into<String>) -> Self {
        Self::ModelClient {
            detail: detail.into(),
        }
    }

    /// True for failures of the harness's own infrastructure (as opposed to
    /// the task backend), which default to exclusion from the report.
    pub fn is_model_client(&self) -> bool {
        matches!(self, Self::ModelClient { .. })
    }
}
