//! Parameter schemas for actions

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// JSON type a parameter must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
            ParamKind::Any => "any",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
            ParamKind::Any => true,
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

/// Declared parameters of an action
///
/// Undeclared parameters are accepted and passed through to the handler.
/// A `null` value counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParamSchema {
    params: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Check presence of required parameters and the type of every declared one
    pub fn validate(&self, params: &Map<String, Value>) -> Result<(), String> {
        let mut problems = Vec::new();
        for spec in &self.params {
            match params.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        problems.push(format!("missing required parameter '{}'", spec.name));
                    }
                }
                Some(value) if !spec.kind.matches(value) => {
                    problems.push(format!(
                        "parameter '{}' must be {}, got {}",
                        spec.name,
                        spec.kind,
                        json_type(value)
                    ));
                }
                Some(_) => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    /// Compact one-line rendering for prompts, e.g. `{message: string, tone?: string}`
    pub fn signature(&self) -> String {
        let fields = self
            .params
            .iter()
            .map(|p| {
                let marker = if p.required { "" } else { "?" };
                format!("{}{}: {}", p.name, marker, p.kind)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{fields}}}")
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
