//! Grader: reconciles a terminated episode against the scenario's success
//! predicate and emits a binary reward.
//!
//! No partial credit by design. Answer-match predicates compare the agent's
//! final answer payload (tolerance-based for numerics, case-insensitive for
//! categorical values); state-check predicates issue read-only verification
//! requests through the same backend seam the episodes use.

use std::sync::Arc;

use crate::backend::Backend;
use crate::model::{
    BackendStatus, EpisodeState, RecordRequest, Scenario, ScoreResult, StateExpectation,
    SuccessPredicate, TerminationReason,
};

pub struct Grader {
    backend: Arc<dyn Backend>,
}

impl Grader {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn grade(&self, scenario: &Scenario, state: &EpisodeState) -> ScoreResult {
        match state.termination_reason {
            Some(TerminationReason::FatalError) => {
                ScoreResult::fail(&state.scenario_id, "backend failure")
            }
            Some(TerminationReason::TurnLimitExceeded) => ScoreResult::fail(
                &state.scenario_id,
                "turn limit exceeded without completion",
            ),
            Some(TerminationReason::FinishedByAgent) => {
                self.grade_finished(scenario, state).await
            }
            None => ScoreResult::fail(&state.scenario_id, "episode did not terminate"),
        }
    }

    async fn grade_finished(&self, scenario: &Scenario, state: &EpisodeState) -> ScoreResult {
        match &scenario.predicate {
            SuccessPredicate::AnswerMatch {
                expected,
                tolerance,
                case_insensitive,
            } => match &state.final_answer {
                Some(answer) => {
                    if answer_matches(expected, answer, *tolerance, *case_insensitive) {
                        ScoreResult::pass(&state.scenario_id, "final answer matched expected value")
                    } else {
                        ScoreResult::fail(
                            &state.scenario_id,
                            format!("final answer {answer} did not match expected {expected}"),
                        )
                    }
                }
                None => ScoreResult::fail(&state.scenario_id, "agent finished without an answer"),
            },
            SuccessPredicate::StateCheck { checks } => {
                self.verify_state(&state.scenario_id, checks).await
            }
        }
    }

    async fn verify_state(&self, scenario_id: &str, checks: &[StateExpectation]) -> ScoreResult {
        for check in checks {
            let req = RecordRequest::Read {
                url: check.request.clone(),
            };
            let result = match self.backend.execute(&req).await {
                Ok(r) => r,
                Err(e) => {
                    return ScoreResult::fail(
                        scenario_id,
                        format!("backend failure during state verification: {e}"),
                    )
                }
            };
            if result.status != BackendStatus::Success {
                return ScoreResult::fail(
                    scenario_id,
                    format!(
                        "state verification request {} was rejected: {}",
                        check.request, result.payload
                    ),
                );
            }
            let observed = result.payload.pointer(&check.pointer);
            let matched = observed
                .map(|v| answer_matches(&check.expect, v, 1e-6, true))
                .unwrap_or(false);
            if !matched {
                let observed = observed.cloned().unwrap_or(serde_json::Value::Null);
                return ScoreResult::fail(
                    scenario_id,
                    format!(
                        "state check failed at {}{}: expected {}, observed {}",
                        check.request, check.pointer, check.expect, observed
                    ),
                );
            }
        }
        ScoreResult::pass(scenario_id, "all state checks passed")
    }
}

/// Structural value comparison: numeric values within tolerance, strings
/// optionally case-insensitive, containers element-wise. A single-element
/// list and its element compare equal in either direction, since agents
/// answer `FINISH(["x"])` for scalar questions.
pub fn answer_matches(
    expected: &serde_json::Value,
    got: &serde_json::Value,
    tolerance: f64,
    case_insensitive: bool,
) -> bool {
    use serde_json::Value;

    if let (Some(a), Some(b)) = (as_number(expected), as_number(got)) {
        return (a - b).abs() <= tolerance;
    }

    match (expected, got) {
        (Value::String(a), Value::String(b)) => {
            if case_insensitive {
                a.trim().eq_ignore_ascii_case(b.trim())
            } else {
                a.trim() == b.trim()
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|(x, y)| answer_matches(x, y, tolerance, case_insensitive))
        }
        (Value::Array(a), b) if a.len() == 1 => {
            answer_matches(&a[0], b, tolerance, case_insensitive)
        }
        (a, Value::Array(b)) if b.len() == 1 => {
            answer_matches(a, &b[0], tolerance, case_insensitive)
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.get(k)
                        .is_some_and(|w| answer_matches(v, w, tolerance, case_insensitive))
                })
        }
        (a, b) => a == b,
    }
}

/// Numbers and numeric strings compare as numbers ("5.5" answers a 5.5).
fn as_number(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::ScriptedBackend;
    use crate::model::BackendResult;
    use serde_json::json;

    fn scenario(predicate: SuccessPredicate) -> Scenario {
        Scenario {
            id: "task1_0".into(),
            instructions: "q".into(),
            context: String::new(),
            predicate,
            turn_limit: 8,
        }
    }

    fn finished_with(answer: serde_json::Value) -> EpisodeState {
        let mut st = EpisodeState::new("task1_0");
        st.final_answer = Some(answer);
        st.terminate(TerminationReason::FinishedByAgent);
        st
    }

    fn answer_scenario(expected: serde_json::Value) -> Scenario {
        scenario(SuccessPredicate::AnswerMatch {
            expected,
            tolerance: 1e-6,
            case_insensitive: true,
        })
    }

    #[tokio::test]
    async fn exact_answer_match_scores_one() {
        let grader = Grader::new(Arc::new(ScriptedBackend::new()));
        let sc = answer_scenario(json!(["1.8"]));
        let score = grader.grade(&sc, &finished_with(json!(["1.8"]))).await;
        assert_eq!(score.reward, 1.0);
    }

    #[tokio::test]
    async fn turn_limit_reason_is_verbatim() {
        let grader = Grader::new(Arc::new(ScriptedBackend::new()));
        let mut st = EpisodeState::new("task1_0");
        st.terminate(TerminationReason::TurnLimitExceeded);
        let score = grader.grade(&answer_scenario(json!("x")), &st).await;
        assert_eq!(score.reward, 0.0);
        assert_eq!(score.reason, "turn limit exceeded without completion");
    }

    #[tokio::test]
    async fn fatal_error_bypasses_predicate() {
        let grader = Grader::new(Arc::new(ScriptedBackend::new()));
        let mut st = EpisodeState::new("task1_0");
        st.final_answer = Some(json!("would have matched"));
        st.terminate_fatal(crate::errors::EpisodeError::backend_unavailable("down"));
        let score = grader
            .grade(&answer_scenario(json!("would have matched")), &st)
            .await;
        assert_eq!(score.reward, 0.0);
        assert_eq!(score.reason, "backend failure");
    }

    #[tokio::test]
    async fn finish_no_action_fails_answer_predicates() {
        let grader = Grader::new(Arc::new(ScriptedBackend::new()));
        let mut st = EpisodeState::new("task1_0");
        st.terminate(TerminationReason::FinishedByAgent);
        let score = grader.grade(&answer_scenario(json!("x")), &st).await;
        assert_eq!(score.reward, 0.0);
        assert!(score.reason.contains("without an answer"));
    }

    #[tokio::test]
    async fn state_check_passes_and_is_idempotent() {
        let payload = json!({"total": 1, "entry": [{"resource": {"status": "active"}}]});
        let backend = Arc::new(
            ScriptedBackend::new().with_default(Ok(BackendResult::success(payload))),
        );
        let grader = Grader::new(backend.clone());
        let sc = scenario(SuccessPredicate::StateCheck {
            checks: vec![StateExpectation {
                request: "MedicationRequest?patient=S123".into(),
                pointer: "/entry/0/resource/status".into(),
                expect: json!("active"),
            }],
        });
        let mut st = EpisodeState::new("task1_0");
        st.terminate(TerminationReason::FinishedByAgent);

        let first = grader.grade(&sc, &st).await;
        let second = grader.grade(&sc, &st).await;
        assert_eq!(first.reward, 1.0);
        assert_eq!(first.reward, second.reward);
        // verification is read-only
        assert!(backend
            .requests()
            .iter()
            .all(|r| matches!(r, RecordRequest::Read { .. })));
    }

    #[tokio::test]
    async fn state_check_mismatch_scores_zero() {
        let backend = Arc::new(ScriptedBackend::new().with_default(Ok(
            BackendResult::success(json!({"total": 0})),
        )));
        let grader = Grader::new(backend);
        let sc = scenario(SuccessPredicate::StateCheck {
            checks: vec![StateExpectation {
                request: "Observation?patient=S123".into(),
                pointer: "/total".into(),
                expect: json!(1),
            }],
        });
        let mut st = EpisodeState::new("task1_0");
        st.terminate(TerminationReason::FinishedByAgent);
        let score = grader.grade(&sc, &st).await;
        assert_eq!(score.reward, 0.0);
        assert!(score.reason.contains("state check failed"));
    }

    #[test]
    fn numeric_tolerance_and_numeric_strings() {
        assert!(answer_matches(&json!(5.5), &json!("5.5"), 1e-6, true));
        assert!(answer_matches(&json!(5.5), &json!(5.5000001), 1e-6, true));
        assert!(!answer_matches(&json!(5.5), &json!(5.6), 1e-6, true));
    }

    #[test]
    fn categorical_strings_compare_case_insensitively() {
        assert!(answer_matches(&json!("Active"), &json!("active"), 1e-6, true));
        assert!(!answer_matches(&json!("Active"), &json!("active"), 1e-6, false));
    }

    #[test]
    fn singleton_lists_unwrap_either_way() {
        assert!(answer_matches(&json!("x"), &json!(["x"]), 1e-6, true));
        assert!(answer_matches(&json!(["x"]), &json!("x"), 1e-6, true));
        assert!(!answer_matches(&json!(["x", "y"]), &json!("x"), 1e-6, true));
    }
}
