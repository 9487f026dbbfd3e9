//! Scenario loading: maps raw dataset cases to immutable [`Scenario`]s.
//!
//! Pure data transformation, no side effects. A case that cannot be mapped
//! yields `MalformedScenario` and aborts that scenario only; the rest of the
//! dataset still loads.

use serde::Deserialize;
use std::path::Path;

use crate::errors::HarnessError;
use crate::model::{Scenario, StateExpectation, SuccessPredicate};

/// Operation keywords the agent is expected to use. The grammar is
/// configuration data shipped alongside the dataset, not a hard-coded
/// contract; defaults match the standard prompt wording.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Grammar {
    pub read_keyword: String,
    pub create_keyword: String,
    pub update_keyword: String,
    pub finish_keyword: String,
}

impl Default for Grammar {
    fn default() -> Self {
        Self {
            read_keyword: "GET".into(),
            create_keyword: "POST".into(),
            update_keyword: "PUT".into(),
            finish_keyword: "FINISH".into(),
        }
    }
}

/// Function catalog shown to the agent in the first prompt, plus an optional
/// grammar override. The catalog body is opaque to the harness.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCatalog {
    pub functions: serde_json::Value,
    #[serde(default)]
    pub grammar: Grammar,
}

impl FunctionCatalog {
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("failed to read functions {}: {}", path.display(), e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            HarnessError::Config(format!(
                "failed to parse functions {}: {}",
                path.display(),
                e
            ))
        })?;
        // Accept either a bare function list or a catalog object.
        if value.get("functions").is_some() {
            serde_json::from_value(value).map_err(|e| {
                HarnessError::Config(format!("invalid function catalog {}: {}", path.display(), e))
            })
        } else {
            Ok(Self {
                functions: value,
                grammar: Grammar::default(),
            })
        }
    }
}

/// Raw dataset entry as authored. `sol` and `expected_state` are the two
/// predicate sources; exactly the present one decides the predicate kind.
#[derive(Debug, Clone, Deserialize)]
struct CaseRecord {
    id: String,
    #[serde(default)]
    instruction: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    sol: Option<serde_json::Value>,
    #[serde(default)]
    expected_state: Option<Vec<StateExpectation>>,
    #[serde(default)]
    turn_limit: Option<u32>,
    #[serde(default, alias = "eval_MRN")]
    eval_mrn: Option<String>,
}

/// Loaded dataset: well-formed scenarios plus per-case load failures.
#[derive(Debug, Default)]
pub struct Dataset {
    pub scenarios: Vec<Scenario>,
    pub malformed: Vec<HarnessError>,
}

pub fn load_dataset(
    path: &Path,
    default_turn_limit: u32,
    tasks: Option<&[String]>,
    samples: Option<usize>,
) -> Result<Dataset, HarnessError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Config(format!("failed to read dataset {}: {}", path.display(), e))
    })?;
    let cases: Vec<CaseRecord> = serde_json::from_str(&text).map_err(|e| {
        HarnessError::Config(format!("failed to parse dataset {}: {}", path.display(), e))
    })?;

    let mut dataset = Dataset::default();
    for case in cases {
        let task = case.id.split('_').next().unwrap_or(&case.id).to_string();
        if let Some(filter) = tasks {
            if !filter.iter().any(|t| t == &task) {
                continue;
            }
        }
        match map_case(case, default_turn_limit) {
            Ok(sc) => dataset.scenarios.push(sc),
            Err(e) => dataset.malformed.push(e),
        }
        if let Some(n) = samples {
            if dataset.scenarios.len() >= n {
                break;
            }
        }
    }
    Ok(dataset)
}

fn map_case(case: CaseRecord, default_turn_limit: u32) -> Result<Scenario, HarnessError> {
    if case.instruction.trim().is_empty() {
        return Err(HarnessError::MalformedScenario {
            id: case.id,
            detail: "missing instruction".into(),
        });
    }
    let predicate = match (case.expected_state, case.sol) {
        (Some(checks), _) if !checks.is_empty() => SuccessPredicate::StateCheck { checks },
        (_, Some(sol)) => SuccessPredicate::AnswerMatch {
            expected: sol,
            tolerance: 1e-6,
            case_insensitive: true,
        },
        _ => {
            return Err(HarnessError::MalformedScenario {
                id: case.id,
                detail: "missing success predicate (neither sol nor expected_state)".into(),
            })
        }
    };
    let turn_limit = case.turn_limit.unwrap_or(default_turn_limit);
    if turn_limit == 0 {
        return Err(HarnessError::MalformedScenario {
            id: case.id,
            detail: "turn_limit must be positive".into(),
        });
    }
    // The record identifier grounds the task; fold it into the context the
    // agent sees, the same way the dataset's own context strings read.
    let context = match case.eval_mrn {
        Some(mrn) if !case.context.contains(&mrn) => {
            if case.context.is_empty() {
                format!("Patient MRN: {mrn}")
            } else {
                format!("{} (Patient MRN: {mrn})", case.context)
            }
        }
        _ => case.context,
    };
    Ok(Scenario {
        id: case.id,
        instructions: case.instruction,
        context,
        predicate,
        turn_limit,
    })
}
