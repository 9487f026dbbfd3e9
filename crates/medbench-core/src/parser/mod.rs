//! Action parser: turns one free-text agent turn into exactly one
//! [`Action`], or a recoverable [`ParseFailure`].
//!
//! Structural extraction only. Parameter values are not validated here; a
//! syntactically fine request for a nonsense date is the backend's problem.

use crate::model::Action;
use crate::scenario::Grammar;

/// Recoverable parse outcome. The episode driver turns this into one
/// corrective system turn; it is never a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub message: String,
    pub raw: String,
}

impl ParseFailure {
    fn new(message: impl Into<String>, raw: &str) -> Self {
        Self {
            message: message.into(),
            raw: raw.to_string(),
        }
    }
}

/// Strip code-fence markers the agent may wrap its call in.
fn strip_fences(text: &str) -> String {
    text.replace("```tool_code", "")
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Read,
    Create,
    Update,
    Finish,
}

fn leading_keyword(line: &str, grammar: &Grammar) -> Option<Keyword> {
    let first = line.trim_start().split_whitespace().next()?;
    let first = first.split('(').next().unwrap_or(first);
    if first.eq_ignore_ascii_case(&grammar.read_keyword) {
        Some(Keyword::Read)
    } else if first.eq_ignore_ascii_case(&grammar.create_keyword) {
        Some(Keyword::Create)
    } else if first.eq_ignore_ascii_case(&grammar.update_keyword) {
        Some(Keyword::Update)
    } else if first.eq_ignore_ascii_case(&grammar.finish_keyword) {
        Some(Keyword::Finish)
    } else {
        None
    }
}

/// Parse the agent's latest turn into exactly one action.
///
/// Classification rules:
/// - a well-formed structured call parses directly;
/// - a known keyword followed by a malformed body is a [`ParseFailure`];
/// - text with no grammar keyword on any line is a terminal
///   natural-language answer (`FinishWithAnswer` with the raw text);
/// - blank output is a [`ParseFailure`].
pub fn parse_action(raw: &str, grammar: &Grammar) -> Result<Action, ParseFailure> {
    let cleaned = strip_fences(raw);
    if cleaned.is_empty() {
        return Err(ParseFailure::new("empty response", raw));
    }

    let first_line = cleaned.lines().next().unwrap_or("").trim();
    match leading_keyword(first_line, grammar) {
        Some(Keyword::Finish) => parse_finish(&cleaned, raw, grammar),
        Some(Keyword::Read) => parse_read(&cleaned, raw, grammar),
        Some(Keyword::Create) => parse_with_payload(&cleaned, raw, grammar, true),
        Some(Keyword::Update) => parse_with_payload(&cleaned, raw, grammar, false),
        None => {
            // A keyword further down means the agent attempted a call but
            // buried it in prose: corrective feedback, not a terminal answer.
            if cleaned
                .lines()
                .skip(1)
                .any(|l| leading_keyword(l, grammar).is_some())
            {
                return Err(ParseFailure::new(
                    "no valid action found: a call must start at the first line of the response",
                    raw,
                ));
            }
            Ok(Action::FinishWithAnswer {
                answer: serde_json::Value::String(cleaned),
                raw: raw.to_string(),
            })
        }
    }
}

fn parse_finish(cleaned: &str, raw: &str, grammar: &Grammar) -> Result<Action, ParseFailure> {
    let body = cleaned.trim();
    let after = &body[grammar.finish_keyword.len()..];
    let Some(inner) = after
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.trim_end().strip_suffix(')'))
    else {
        return Err(ParseFailure::new(
            format!(
                "{} must be called as {}([answer1, answer2, ...])",
                grammar.finish_keyword, grammar.finish_keyword
            ),
            raw,
        ));
    };
    let inner = inner.trim();
    if inner.is_empty() || inner == "[]" {
        return Ok(Action::FinishNoAction {
            raw: raw.to_string(),
        });
    }
    match serde_json::from_str::<serde_json::Value>(inner) {
        Ok(answer) => Ok(Action::FinishWithAnswer {
            answer,
            raw: raw.to_string(),
        }),
        Err(e) => Err(ParseFailure::new(
            format!(
                "{} payload is not JSON-loadable: {}",
                grammar.finish_keyword, e
            ),
            raw,
        )),
    }
}

fn parse_read(cleaned: &str, raw: &str, grammar: &Grammar) -> Result<Action, ParseFailure> {
    let rest = cleaned[grammar.read_keyword.len()..].trim();
    if rest.is_empty() {
        return Err(ParseFailure::new(
            format!("{} requires a URL", grammar.read_keyword),
            raw,
        ));
    }
    if rest.split_whitespace().count() > 1 {
        return Err(ParseFailure::new(
            format!("{} takes a single URL and nothing else", grammar.read_keyword),
            raw,
        ));
    }
    Ok(Action::ReadRecord {
        url: rest.to_string(),
        raw: raw.to_string(),
    })
}

fn parse_with_payload(
    cleaned: &str,
    raw: &str,
    grammar: &Grammar,
    create: bool,
) -> Result<Action, ParseFailure> {
    let keyword = if create {
        &grammar.create_keyword
    } else {
        &grammar.update_keyword
    };
    let mut lines = cleaned.lines();
    let first = lines.next().unwrap_or("").trim();
    let url = first[keyword.len()..].trim().to_string();
    if url.is_empty() {
        return Err(ParseFailure::new(format!("{keyword} requires a URL"), raw));
    }
    let body: String = lines.collect::<Vec<_>>().join("\n");
    if body.trim().is_empty() {
        return Err(ParseFailure::new(
            format!("{keyword} requires a JSON payload on the following lines"),
            raw,
        ));
    }
    let payload = serde_json::from_str::<serde_json::Value>(&body).map_err(|e| {
        ParseFailure::new(format!("{keyword} payload is not valid JSON: {e}"), raw)
    })?;
    if create {
        Ok(Action::CreateRecord {
            url,
            payload,
            raw: raw.to_string(),
        })
    } else {
        Ok(Action::UpdateRecord {
            url,
            payload,
            raw: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn g() -> Grammar {
        Grammar::default()
    }

    #[test]
    fn read_round_trip() {
        let raw = "GET http://fhir/Patient?identifier=S123&_count=1";
        let action = parse_action(raw, &g()).expect("parse");
        assert_eq!(
            action,
            Action::ReadRecord {
                url: "http://fhir/Patient?identifier=S123&_count=1".into(),
                raw: raw.into(),
            }
        );
        assert_eq!(action.operation_name(), "read-record");
    }

    #[test]
    fn create_round_trip_recovers_payload() {
        let raw = "POST http://fhir/Observation\n{\"code\": {\"text\": \"BP\"}, \"valueQuantity\": {\"value\": 120}}";
        let action = parse_action(raw, &g()).expect("parse");
        match action {
            Action::CreateRecord { url, payload, .. } => {
                assert_eq!(url, "http://fhir/Observation");
                assert_eq!(payload["valueQuantity"]["value"], json!(120));
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn update_uses_put_keyword() {
        let raw = "PUT http://fhir/MedicationRequest/5\n{\"status\": \"completed\"}";
        let action = parse_action(raw, &g()).expect("parse");
        assert!(matches!(action, Action::UpdateRecord { .. }));
    }

    #[test]
    fn finish_with_answer_list() {
        let action = parse_action("FINISH([\"120\", \"mmHg\"])", &g()).expect("parse");
        assert_eq!(
            action,
            Action::FinishWithAnswer {
                answer: json!(["120", "mmHg"]),
                raw: "FINISH([\"120\", \"mmHg\"])".into(),
            }
        );
    }

    #[test]
    fn finish_empty_is_no_action() {
        assert!(matches!(
            parse_action("FINISH()", &g()).expect("parse"),
            Action::FinishNoAction { .. }
        ));
        assert!(matches!(
            parse_action("FINISH([])", &g()).expect("parse"),
            Action::FinishNoAction { .. }
        ));
    }

    #[test]
    fn fenced_call_is_unwrapped() {
        let raw = "```tool_code\nGET http://fhir/Patient?_id=1\n```";
        assert!(matches!(
            parse_action(raw, &g()).expect("parse"),
            Action::ReadRecord { .. }
        ));
    }

    #[test]
    fn free_prose_is_a_terminal_answer() {
        let raw = "The patient's most recent magnesium level is 1.8 mg/dL.";
        match parse_action(raw, &g()).expect("parse") {
            Action::FinishWithAnswer { answer, .. } => {
                assert_eq!(answer, json!(raw));
            }
            other => panic!("expected terminal answer, got {other:?}"),
        }
    }

    #[test]
    fn malformed_calls_fail_recoverably() {
        assert!(parse_action("", &g()).is_err());
        assert!(parse_action("GET", &g()).is_err());
        assert!(parse_action("GET http://a http://b", &g()).is_err());
        assert!(parse_action("POST http://fhir/Observation", &g()).is_err());
        assert!(parse_action("POST http://fhir/Observation\nnot json", &g()).is_err());
        assert!(parse_action("FINISH [1]", &g()).is_err());
        assert!(parse_action("FINISH([1, )", &g()).is_err());
    }

    #[test]
    fn keywords_dispatch_case_insensitively() {
        assert!(matches!(
            parse_action("get http://fhir/Patient?_id=1", &g()).expect("parse"),
            Action::ReadRecord { .. }
        ));
        assert!(matches!(
            parse_action("post http://fhir/Observation\n{}", &g()).expect("parse"),
            Action::CreateRecord { .. }
        ));
        assert!(matches!(
            parse_action("put http://fhir/MedicationRequest/5\n{}", &g()).expect("parse"),
            Action::UpdateRecord { .. }
        ));
        assert!(matches!(
            parse_action("finish([1])", &g()).expect("parse"),
            Action::FinishWithAnswer { .. }
        ));
    }

    #[test]
    fn buried_call_is_a_parse_failure_not_an_answer() {
        let raw = "I will now fetch the record.\nGET http://fhir/Patient?_id=1";
        let err = parse_action(raw, &g()).unwrap_err();
        assert!(err.message.contains("first line"));
    }

    #[test]
    fn keywords_come_from_the_grammar() {
        let grammar = Grammar {
            finish_keyword: "DONE".into(),
            ..Grammar::default()
        };
        assert!(matches!(
            parse_action("DONE([42])", &grammar).expect("parse"),
            Action::FinishWithAnswer { .. }
        ));
        // Default FINISH is now just prose under this grammar.
        assert!(matches!(
            parse_action("FINISH done with everything", &grammar).expect("parse"),
            Action::FinishWithAnswer { .. }
        ));
    }
}
