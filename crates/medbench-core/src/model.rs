//! Core data model: scenarios, turns, actions and episode state.
//!
//! Everything here is plain data. The episode driver is the only mutator of
//! [`EpisodeState`]; all other consumers read a terminated snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::EpisodeError;

/// Who produced a turn: the agent under evaluation, or the harness side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Agent,
    System,
}

/// One unit of dialogue in an episode transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// A structured intent parsed from one agent turn.
///
/// `raw` keeps the original agent text for audit; it never participates in
/// equality-sensitive logic beyond debugging output.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ReadRecord {
        url: String,
        raw: String,
    },
    CreateRecord {
        url: String,
        payload: serde_json::Value,
        raw: String,
    },
    UpdateRecord {
        url: String,
        payload: serde_json::Value,
        raw: String,
    },
    FinishWithAnswer {
        answer: serde_json::Value,
        raw: String,
    },
    FinishNoAction {
        raw: String,
    },
}

impl Action {
    /// Terminal actions end the episode and never reach the backend.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Action::FinishWithAnswer { .. } | Action::FinishNoAction { .. }
        )
    }

    pub fn operation_name(&self) -> &'static str {
        match self {
            Action::ReadRecord { .. } => "read-record",
            Action::CreateRecord { .. } => "create-record",
            Action::UpdateRecord { .. } => "update-record",
            Action::FinishWithAnswer { .. } => "finish-with-answer",
            Action::FinishNoAction { .. } => "finish-no-action",
        }
    }

    /// Backend request for a non-terminal action; `None` for finishing ones.
    pub fn to_request(&self) -> Option<RecordRequest> {
        match self {
            Action::ReadRecord { url, .. } => Some(RecordRequest::Read { url: url.clone() }),
            Action::CreateRecord { url, payload, .. } => Some(RecordRequest::Create {
                url: url.clone(),
                payload: payload.clone(),
            }),
            Action::UpdateRecord { url, payload, .. } => Some(RecordRequest::Update {
                url: url.clone(),
                payload: payload.clone(),
            }),
            Action::FinishWithAnswer { .. } | Action::FinishNoAction { .. } => None,
        }
    }
}

/// One request against the record server. This is the backend adapter's
/// entire input surface; terminal actions have no representation here.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordRequest {
    Read {
        url: String,
    },
    Create {
        url: String,
        payload: serde_json::Value,
    },
    Update {
        url: String,
        payload: serde_json::Value,
    },
}

impl RecordRequest {
    pub fn url(&self) -> &str {
        match self {
            RecordRequest::Read { url }
            | RecordRequest::Create { url, .. }
            | RecordRequest::Update { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Success,
    Rejected,
    Error,
}

/// Outcome of executing one [`RecordRequest`]. Consumed immediately to
/// produce the next system turn; not persisted beyond the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    pub status: BackendStatus,
    pub payload: serde_json::Value,
}

impl BackendResult {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            status: BackendStatus::Success,
            payload,
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            status: BackendStatus::Rejected,
            payload: serde_json::Value::String(detail.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    FinishedByAgent,
    TurnLimitExceeded,
    FatalError,
}

/// Expected final condition for one scenario. Pluggable per scenario: the
/// grader only ever goes through [`crate::grader::Grader::grade`], so new
/// predicate kinds extend this enum without touching the episode driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SuccessPredicate {
    AnswerMatch {
        expected: serde_json::Value,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        #[serde(default = "default_case_insensitive")]
        case_insensitive: bool,
    },
    StateCheck {
        checks: Vec<StateExpectation>,
    },
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_case_insensitive() -> bool {
    true
}

/// One read-only verification request plus the value expected at a JSON
/// pointer inside its response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateExpectation {
    /// Relative path + query against the record server, e.g.
    /// `Observation?patient=S123&code=8867-4`.
    pub request: String,
    /// JSON pointer into the response body, e.g. `/entry/0/resource/valueQuantity/value`.
    pub pointer: String,
    pub expect: serde_json::Value,
}

/// Immutable description of one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub instructions: String,
    #[serde(default)]
    pub context: String,
    pub predicate: SuccessPredicate,
    pub turn_limit: u32,
}

impl Scenario {
    /// Task family prefix, e.g. `task1_3` belongs to `task1`.
    pub fn task_id(&self) -> &str {
        self.id.split('_').next().unwrap_or(&self.id)
    }
}

/// Mutable episode bookkeeping, owned by the driver until termination.
#[derive(Debug, Clone)]
pub struct EpisodeState {
    pub scenario_id: String,
    pub transcript: Vec<Turn>,
    pub turns_used: u32,
    pub terminated: bool,
    pub termination_reason: Option<TerminationReason>,
    pub final_answer: Option<serde_json::Value>,
    /// Populated only for `FatalError` terminations.
    pub fatal: Option<EpisodeError>,
}

impl EpisodeState {
    pub fn new(scenario_id: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            transcript: Vec::new(),
            turns_used: 0,
            terminated: false,
            termination_reason: None,
            final_answer: None,
            fatal: None,
        }
    }

    /// Append-only transcript writes; silently dropped after termination so
    /// the "no turns after terminated" invariant cannot be violated.
    pub fn push(&mut self, turn: Turn) {
        if !self.terminated {
            self.transcript.push(turn);
        }
    }

    /// Terminate exactly once; later calls are no-ops.
    pub fn terminate(&mut self, reason: TerminationReason) {
        if !self.terminated {
            self.terminated = true;
            self.termination_reason = Some(reason);
        }
    }

    pub fn terminate_fatal(&mut self, err: EpisodeError) {
        if !self.terminated {
            self.fatal = Some(err);
            self.terminate(TerminationReason::FatalError);
        }
    }
}

/// Binary grading outcome for one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub scenario_id: String,
    pub reward: f64,
    pub reason: String,
}

impl ScoreResult {
    pub fn pass(scenario_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            reward: 1.0,
            reason: reason.into(),
        }
    }

    pub fn fail(scenario_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            reward: 0.0,
            reason: reason.into(),
        }
    }
}
