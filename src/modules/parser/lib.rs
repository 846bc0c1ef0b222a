//! SQL classification and action file parsing for Switchyard
//!
//! This crate holds the statement classifier shared by every SQL-shaped
//! connector, and the loader for action files: YAML or JSON documents
//! describing one resource and one action, with `{{ env.NAME }}`
//! substitution and validation.

pub mod env;
pub mod sql;
pub mod validator;
pub mod yaml;

pub use sql::{is_select_sql, Keyword, Lexer, Token, TokenKind};
pub use validator::ActionFileValidator;
pub use yaml::{ActionFileParser, FileFormat};

use switchyard_core::{ActionFile, SwitchyardError};

/// Read, substitute, decode and validate an action file
pub fn parse_file(path: &str) -> Result<ActionFile, SwitchyardError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SwitchyardError::Config(format!("Failed to read file '{}': {}", path, e)))?;

    parse_string(&content, FileFormat::from_path(path))
}

/// Substitute, decode and validate action file content
pub fn parse_string(content: &str, format: FileFormat) -> Result<ActionFile, SwitchyardError> {
    let file = ActionFileParser::new().parse(content, format)?;

    ActionFileValidator::new().validate(&file)?;

    Ok(file)
}
