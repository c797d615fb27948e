//! Decision parsing
//!
//! Model output is accepted when it contains a JSON object (possibly wrapped
//! in prose or a code fence) with an `action` naming a registered action and
//! a `params` object. `parameters` is accepted for `params` and `reasoning`
//! for `rationale`.

use serde::Serialize;
use serde_json::{Map, Value};

/// What the reasoning engine decided to do
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub action: String,
    pub params: Map<String, Value>,
    pub rationale: String,
}

impl Decision {
    pub fn new(action: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Map::new(),
            rationale: rationale.into(),
        }
    }
}

/// Why a model answer was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReasoningParseError {
    #[error("no JSON object found in the response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("unknown action '{action}', expected one of: {}", .available.join(", "))]
    UnknownAction {
        action: String,
        available: Vec<String>,
    },
}

/// Span from the first `{` to the last `}`
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a model answer against the set of registered action names
pub fn parse_decision(text: &str, known_actions: &[String]) -> Result<Decision, ReasoningParseError> {
    let json = extract_object(text).ok_or(ReasoningParseError::NoJson)?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| ReasoningParseError::InvalidJson(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(ReasoningParseError::InvalidJson(
            "expected a JSON object".to_string(),
        ));
    };

    let action = object
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(ReasoningParseError::MissingField("action"))?
        .to_string();

    let params = match object.remove("params").or_else(|| object.remove("parameters")) {
        Some(Value::Object(params)) => params,
        Some(Value::Null) | None => return Err(ReasoningParseError::MissingField("params")),
        Some(_) => {
            return Err(ReasoningParseError::InvalidJson(
                "'params' must be an object".to_string(),
            ));
        }
    };

    let rationale = ["rationale", "reasoning"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let canonical = known_actions
        .iter()
        .find(|name| name.eq_ignore_ascii_case(&action))
        .ok_or_else(|| ReasoningParseError::UnknownAction {
            action: action.clone(),
            available: known_actions.to_vec(),
        })?;

    Ok(Decision {
        action: canonical.clone(),
        params,
        rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions() -> Vec<String> {
        vec!["observe".to_string(), "reflect".to_string(), "wait".to_string()]
    }

    #[test]
    fn test_parse_plain_object() {
        let decision = parse_decision(
            r#"{"action": "wait", "params": {"duration_secs": 3}, "rationale": "nothing to do"}"#,
            &actions(),
        )
        .unwrap();
        assert_eq!(decision.action, "wait");
        assert_eq!(decision.params["duration_secs"], 3);
        assert_eq!(decision.rationale, "nothing to do");
    }

    #[test]
    fn test_parse_object_inside_code_fence() {
        let text = "Sure! Here is my decision:\n```json\n{\"action\": \"Observe\", \"parameters\": {}, \"reasoning\": \"look around\"}\n```\nHope that helps.";
        let decision = parse_decision(text, &actions()).unwrap();
        assert_eq!(decision.action, "observe");
        assert_eq!(decision.rationale, "look around");
        assert!(decision.params.is_empty());
    }

    #[test]
    fn test_no_json() {
        assert_eq!(
            parse_decision("I think I should wait.", &actions()),
            Err(ReasoningParseError::NoJson)
        );
        assert_eq!(
            parse_decision("} backwards {", &actions()),
            Err(ReasoningParseError::NoJson)
        );
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            parse_decision("{action: wait}", &actions()),
            Err(ReasoningParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            parse_decision(r#"{"params": {}}"#, &actions()),
            Err(ReasoningParseError::MissingField("action"))
        );
        assert_eq!(
            parse_decision(r#"{"action": "wait"}"#, &actions()),
            Err(ReasoningParseError::MissingField("params"))
        );
        assert!(matches!(
            parse_decision(r#"{"action": "wait", "params": [1]}"#, &actions()),
            Err(ReasoningParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_unknown_action_lists_alternatives() {
        let err = parse_decision(r#"{"action": "fly", "params": {}}"#, &actions()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown action 'fly', expected one of: observe, reflect, wait"
        );
    }
}
