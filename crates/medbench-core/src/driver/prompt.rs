//! Prompt construction and system-turn feedback wording.
//!
//! The instruction template is part of the dataset contract: agents are
//! trained against this exact call grammar, so the wording interpolates the
//! grammar keywords rather than hard-coding them.

use crate::model::{BackendResult, BackendStatus, Scenario};
use crate::scenario::Grammar;

const INSTRUCTION_TEMPLATE: &str = "You are an expert in using FHIR functions to assist medical professionals. \
You are given a question and a set of possible functions. Based on the question, \
you will need to make one or more function/tool calls to achieve the purpose.

1. If you decide to invoke a {read} function, you MUST put it in the format of
{read} url?param_name1=param_value1&param_name2=param_value2...

2. If you decide to invoke a {create} function, you MUST put it in the format of
{create} url
[your payload data in JSON format]

3. If you have got answers for all the questions and finished all the requested tasks, \
you MUST call to finish the conversation in the format of (make sure the list is JSON loadable.)
{finish}([answer1, answer2, ...])

Your response must be in the format of one of the three cases, and you can call \
only one function each time. You SHOULD NOT include any other text in the response.

Here is a list of functions in JSON format that you can invoke. Note that you \
should use {api_base} as the api_base.
{functions}

Context: {context}
Question: {question}";

/// First prompt of an episode: instructions, function catalog, scenario
/// context and question.
pub fn initial_prompt(
    scenario: &Scenario,
    grammar: &Grammar,
    api_base: &str,
    functions: &serde_json::Value,
) -> String {
    let functions_json =
        serde_json::to_string_pretty(functions).unwrap_or_else(|_| functions.to_string());
    INSTRUCTION_TEMPLATE
        .replace("{read}", &grammar.read_keyword)
        .replace("{create}", &grammar.create_keyword)
        .replace("{finish}", &grammar.finish_keyword)
        .replace("{api_base}", api_base)
        .replace("{functions}", &functions_json)
        .replace("{context}", &scenario.context)
        .replace("{question}", &scenario.instructions)
}

fn finish_hint(grammar: &Grammar) -> String {
    format!(
        "Please call {} if you have got answers for all the questions and finished all the requested tasks",
        grammar.finish_keyword
    )
}

/// System turn relaying a backend result to the agent.
pub fn backend_feedback(result: &BackendResult, mutating: bool, grammar: &Grammar) -> String {
    match result.status {
        BackendStatus::Success if mutating => {
            format!(
                "Request accepted and executed successfully. {}",
                finish_hint(grammar)
            )
        }
        BackendStatus::Success => {
            format!(
                "Here is the response from the {} request:\n{}. {}",
                grammar.read_keyword,
                result.payload,
                finish_hint(grammar)
            )
        }
        BackendStatus::Rejected | BackendStatus::Error => {
            format!("Error in sending the request: {}", result.payload)
        }
    }
}

/// Corrective system turn after an unparseable agent turn.
pub fn parse_failure_feedback(message: &str, grammar: &Grammar) -> String {
    format!(
        "No valid action found: {}. Respond with exactly one {}/{}/{} call or {}([...]).",
        message,
        grammar.read_keyword,
        grammar.create_keyword,
        grammar.update_keyword,
        grammar.finish_keyword
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SuccessPredicate;

    fn scenario() -> Scenario {
        Scenario {
            id: "task1_0".into(),
            instructions: "What is the most recent magnesium level?".into(),
            context: "Patient MRN: S123".into(),
            predicate: SuccessPredicate::AnswerMatch {
                expected: serde_json::json!("1.8"),
                tolerance: 1e-6,
                case_insensitive: true,
            },
            turn_limit: 8,
        }
    }

    #[test]
    fn initial_prompt_interpolates_all_parts() {
        let p = initial_prompt(
            &scenario(),
            &Grammar::default(),
            "http://localhost:8080/fhir/",
            &serde_json::json!([{"name": "GET Patient"}]),
        );
        assert!(p.contains("http://localhost:8080/fhir/"));
        assert!(p.contains("Patient MRN: S123"));
        assert!(p.contains("most recent magnesium"));
        assert!(p.contains("FINISH([answer1, answer2, ...])"));
        assert!(!p.contains("{api_base}"));
    }

    #[test]
    fn feedback_distinguishes_reads_and_mutations() {
        let g = Grammar::default();
        let ok = BackendResult::success(serde_json::json!({"total": 1}));
        assert!(backend_feedback(&ok, false, &g).contains("response from the GET request"));
        assert!(backend_feedback(&ok, true, &g).contains("accepted and executed"));
        let rej = BackendResult::rejected("status 409: version mismatch");
        assert!(backend_feedback(&rej, true, &g).contains("version mismatch"));
    }
}
