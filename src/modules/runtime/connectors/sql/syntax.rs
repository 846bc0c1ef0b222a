//! Reshaping of MySQL syntax errors (`Error 1064`)

use once_cell::sync::Lazy;
use regex::Regex;
use switchyard_core::SwitchyardError;

const SYNTAX_ERROR_PREFIX: &str = "Error 1064:";

static LINE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"at line (\d+)").unwrap());

static NEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)near '(.*)' at line \d+").unwrap());

/// Turn a rendered driver message into the error surfaced to callers
///
/// Only messages starting with `Error 1064:` are reshaped; every other
/// message passes through as `OperationFailed`.
pub fn reshape_driver_error(message: String) -> SwitchyardError {
    if !message.starts_with(SYNTAX_ERROR_PREFIX) {
        return SwitchyardError::OperationFailed(message);
    }

    let line_number = LINE_PATTERN
        .captures(&message)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .unwrap_or(0);

    let short = match NEAR_PATTERN.captures(&message) {
        Some(caps) => format!("syntax error near '{}'", caps[1].trim()),
        None => message[SYNTAX_ERROR_PREFIX.len()..].trim().to_string(),
    };

    SwitchyardError::SqlSyntax {
        line_number,
        message: short,
    }
}
