//! Episode driver: the conversational state machine.
//!
//! One episode alternates agent turns and backend executions until a
//! terminal operation, the turn budget, or a fatal failure ends it. States
//! and transitions follow the explicit table: `AwaitingAgentTurn` obtains
//! and parses the next agent turn; `AwaitingActionResult` executes exactly
//! one backend request; `Terminated` is reached exactly once.

pub mod prompt;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::backend::Backend;
use crate::errors::EpisodeError;
use crate::model::{Action, EpisodeState, RecordRequest, Scenario, TerminationReason, Turn};
use crate::parser::parse_action;
use crate::providers::llm::{ChatMessage, ModelClient};
use crate::scenario::Grammar;

/// Extra headroom for the backend call bound: the adapter retries a bounded
/// number of times internally, so its outer budget is wider than one call.
const BACKEND_BUDGET_FACTOR: u32 = 4;

enum DriverState {
    AwaitingAgentTurn,
    AwaitingActionResult { req: RecordRequest, mutating: bool },
    Terminated,
}

pub struct EpisodeDriver {
    model: Arc<dyn ModelClient>,
    backend: Arc<dyn Backend>,
    grammar: Grammar,
    functions: serde_json::Value,
    api_base: String,
    call_timeout: Duration,
}

impl EpisodeDriver {
    pub fn new(
        model: Arc<dyn ModelClient>,
        backend: Arc<dyn Backend>,
        grammar: Grammar,
        functions: serde_json::Value,
        api_base: String,
        call_timeout: Duration,
    ) -> Self {
        Self {
            model,
            backend,
            grammar,
            functions,
            api_base,
            call_timeout,
        }
    }

    /// Run one episode to termination. Fatal conditions are recorded on the
    /// returned state, never propagated: containment at the episode boundary
    /// is the orchestrator's contract.
    pub async fn run(&self, scenario: &Scenario) -> EpisodeState {
        let mut state = EpisodeState::new(&scenario.id);
        state.push(Turn::system(prompt::initial_prompt(
            scenario,
            &self.grammar,
            &self.api_base,
            &self.functions,
        )));

        let mut machine = DriverState::AwaitingAgentTurn;
        loop {
            machine = match machine {
                DriverState::AwaitingAgentTurn => self.agent_step(scenario, &mut state).await,
                DriverState::AwaitingActionResult { req, mutating } => {
                    self.action_step(&req, mutating, &mut state).await
                }
                DriverState::Terminated => break,
            };
        }
        debug_assert!(state.terminated);
        debug_assert!(state.turns_used <= scenario.turn_limit);
        state
    }

    async fn agent_step(&self, scenario: &Scenario, state: &mut EpisodeState) -> DriverState {
        if state.turns_used >= scenario.turn_limit {
            tracing::debug!(scenario = %scenario.id, "turn limit reached");
            state.terminate(TerminationReason::TurnLimitExceeded);
            return DriverState::Terminated;
        }

        let messages = chat_messages(&state.transcript);
        let text = match timeout(self.call_timeout, self.model.next_turn(&messages)).await {
            Err(_) => {
                state.terminate_fatal(EpisodeError::model_client(
                    "timed out waiting for the next agent turn",
                ));
                return DriverState::Terminated;
            }
            Ok(Err(e)) => {
                state.terminate_fatal(EpisodeError::model_client(e.to_string()));
                return DriverState::Terminated;
            }
            Ok(Ok(text)) => text,
        };
        state.push(Turn::agent(text.as_str()));

        match parse_action(&text, &self.grammar) {
            Err(failure) => {
                tracing::debug!(scenario = %scenario.id, message = %failure.message, "parse failure");
                state.push(Turn::system(prompt::parse_failure_feedback(
                    &failure.message,
                    &self.grammar,
                )));
                state.turns_used += 1;
                DriverState::AwaitingAgentTurn
            }
            Ok(Action::FinishWithAnswer { answer, .. }) => {
                state.final_answer = Some(answer);
                state.terminate(TerminationReason::FinishedByAgent);
                DriverState::Terminated
            }
            Ok(Action::FinishNoAction { .. }) => {
                state.terminate(TerminationReason::FinishedByAgent);
                DriverState::Terminated
            }
            Ok(action) => {
                let mutating = !matches!(action, Action::ReadRecord { .. });
                match action.to_request() {
                    Some(req) => DriverState::AwaitingActionResult { req, mutating },
                    // Non-terminal actions always map to a request; treat a
                    // gap as a parse failure rather than crashing mid-run.
                    None => {
                        state.push(Turn::system(prompt::parse_failure_feedback(
                            "unsupported operation",
                            &self.grammar,
                        )));
                        state.turns_used += 1;
                        DriverState::AwaitingAgentTurn
                    }
                }
            }
        }
    }

    async fn action_step(
        &self,
        req: &RecordRequest,
        mutating: bool,
        state: &mut EpisodeState,
    ) -> DriverState {
        let budget = self.call_timeout * BACKEND_BUDGET_FACTOR;
        match timeout(budget, self.backend.execute(req)).await {
            Err(_) => {
                state.terminate_fatal(EpisodeError::backend_unavailable(
                    "timed out waiting for the record server",
                ));
                DriverState::Terminated
            }
            Ok(Err(e)) => {
                state.terminate_fatal(e);
                DriverState::Terminated
            }
            Ok(Ok(result)) => {
                state.push(Turn::system(prompt::backend_feedback(
                    &result,
                    mutating,
                    &self.grammar,
                )));
                state.turns_used += 1;
                DriverState::AwaitingAgentTurn
            }
        }
    }
}

/// Provider wire view of the transcript: harness turns read as user
/// messages, agent turns as assistant messages.
fn chat_messages(transcript: &[Turn]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .map(|t| match t.role {
            crate::model::Role::Agent => ChatMessage::assistant(&t.content),
            crate::model::Role::System => ChatMessage::user(&t.content),
        })
        .collect()
}
