//! Inbound message parsing

/// Reply to `/help`
pub const HELP_TEXT: &str = "Commands:
/status - show agent status
/goal <text> - set a new goal
/ping - check that the agent is alive
/help - show this message
Any other message is passed to the agent as a high-priority observation.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    Status,
    Goal(String),
    Ping,
    Help,
    /// Slash command that is not recognised
    Unknown(String),
    /// Plain text for the agent
    Message(String),
}

/// Classify inbound text
///
/// Commands may carry a `@botname` suffix (`/status@mybot`), as chat
/// platforms append it in group conversations.
pub fn parse_inbound(text: &str) -> InboundCommand {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix('/') else {
        return InboundCommand::Message(trimmed.to_string());
    };

    let (word, rest) = match body.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (body, ""),
    };
    let command = word.split('@').next().unwrap_or(word).to_lowercase();

    match command.as_str() {
        "status" => InboundCommand::Status,
        "goal" => InboundCommand::Goal(rest.to_string()),
        "ping" => InboundCommand::Ping,
        "help" | "start" => InboundCommand::Help,
        _ => InboundCommand::Unknown(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(parse_inbound("/status"), InboundCommand::Status);
        assert_eq!(parse_inbound("  /PING  "), InboundCommand::Ping);
        assert_eq!(parse_inbound("/help"), InboundCommand::Help);
        assert_eq!(parse_inbound("/status@garden_bot"), InboundCommand::Status);
    }

    #[test]
    fn test_goal_takes_remaining_text() {
        assert_eq!(
            parse_inbound("/goal  Keep the basil alive "),
            InboundCommand::Goal("Keep the basil alive".to_string())
        );
        assert_eq!(parse_inbound("/goal"), InboundCommand::Goal(String::new()));
    }

    #[test]
    fn test_plain_and_unknown() {
        assert_eq!(
            parse_inbound("it is raining"),
            InboundCommand::Message("it is raining".to_string())
        );
        assert_eq!(
            parse_inbound("/dance now"),
            InboundCommand::Unknown("dance".to_string())
        );
    }
}
