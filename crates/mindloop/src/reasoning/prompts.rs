//! Prompts for the decision step
//!
//! Placeholders are substituted with [`render`].

/// Decision prompt
///
/// Placeholders:
/// - {persona} - how the agent describes itself
/// - {goal} - current goal text
/// - {urgent} - pending operator messages block (may be empty)
/// - {actions} - one line per available action
/// - {memories} - retrieved memory context
pub const DECISION_PROMPT: &str = r#"You are {persona}.

Current goal: {goal}
{urgent}
Available actions:
{actions}

Relevant memories (most important first):
{memories}

Decide the single next action that best advances the goal.
Respond with one JSON object and nothing else, in this form:
{"action": "<action name>", "params": {<parameters>}, "rationale": "<one sentence>"}"#;

/// Follow-up sent when the first answer could not be used
///
/// Placeholders:
/// - {original} - the decision prompt
/// - {response} - the rejected answer
/// - {error} - why it was rejected
/// - {action_names} - comma-separated action names
pub const CORRECTION_PROMPT: &str = r#"{original}

Your previous answer could not be used:
{response}

Problem: {error}

Answer again with only a JSON object of the form
{"action": "<one of: {action_names}>", "params": {...}, "rationale": "..."}"#;

/// Goal text used when none has been set
pub const DEFAULT_GOAL: &str = "No explicit goal yet. Observe, learn and stay helpful.";

/// Substitute `{key}` placeholders in one pass
///
/// Inserted values are never rescanned, so text that happens to contain a
/// placeholder name is left alone. Braces that do not form a known
/// placeholder are copied through.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let matched = vars.iter().find_map(|(key, value)| {
            after
                .strip_prefix(key)
                .and_then(|r| r.strip_prefix('}'))
                .map(|r| (*value, r))
        });
        match matched {
            Some((value, remainder)) => {
                out.push_str(value);
                rest = remainder;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
