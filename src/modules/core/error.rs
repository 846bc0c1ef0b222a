//! Error types for Switchyard

use thiserror::Error;

/// Main error type for Switchyard operations
#[derive(Error, Debug)]
pub enum SwitchyardError {
    /// The registry has no connector for this resource type
    #[error("Unsupported resource type: {0}")]
    UnsupportedType(String),

    /// Resource options failed structural or enum checks
    #[error("Invalid resource options: {0}")]
    InvalidResource(String),

    /// Action template failed structural or enum checks
    #[error("Invalid action options: {0}")]
    InvalidAction(String),

    /// A driver session could not be established
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// A driver call failed after connection
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// The SQL classifier could not tokenise its input
    #[error("SQL parse error: {0}")]
    Parse(String),

    /// The operation is not meaningful for this connector
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// An object exceeds the configured size ceiling
    #[error("Object too large: {size} bytes exceeds the {limit} byte limit")]
    OversizeObject { size: u64, limit: u64 },

    /// MySQL syntax error (`Error 1064`) reshaped for the UI
    #[error("SQL syntax error at line {line_number}: {message}")]
    SqlSyntax { line_number: u32, message: String },

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwitchyardError {
    /// Stable, language-neutral name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            SwitchyardError::UnsupportedType(_) => "UnsupportedType",
            SwitchyardError::InvalidResource(_) => "InvalidResource",
            SwitchyardError::InvalidAction(_) => "InvalidAction",
            SwitchyardError::ConnectFailed(_) => "ConnectFailed",
            SwitchyardError::OperationFailed(_) | SwitchyardError::SqlSyntax { .. } => {
                "OperationFailed"
            }
            SwitchyardError::Parse(_) => "ParseError",
            SwitchyardError::Unsupported(_) => "Unsupported",
            SwitchyardError::OversizeObject { .. } => "OversizeObject",
            SwitchyardError::Config(_) | SwitchyardError::EnvVarNotFound(_) => "Config",
            SwitchyardError::Io(_) | SwitchyardError::Json(_) | SwitchyardError::Internal(_) => {
                "Internal"
            }
        }
    }

    /// Returns true if this error should be logged at error level
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SwitchyardError::ConnectFailed(_)
                | SwitchyardError::OperationFailed(_)
                | SwitchyardError::Io(_)
                | SwitchyardError::Internal(_)
        )
    }

    /// Returns true if this error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SwitchyardError::UnsupportedType(_)
                | SwitchyardError::InvalidResource(_)
                | SwitchyardError::InvalidAction(_)
                | SwitchyardError::Parse(_)
                | SwitchyardError::OversizeObject { .. }
                | SwitchyardError::SqlSyntax { .. }
        )
    }

    /// Returns true for failures raised before any I/O took place
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            SwitchyardError::UnsupportedType(_)
                | SwitchyardError::InvalidResource(_)
                | SwitchyardError::InvalidAction(_)
                | SwitchyardError::Parse(_)
        )
    }

    /// Returns the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SwitchyardError::UnsupportedType(_) => 404,
            SwitchyardError::InvalidResource(_)
            | SwitchyardError::InvalidAction(_)
            | SwitchyardError::Parse(_)
            | SwitchyardError::SqlSyntax { .. } => 400,
            SwitchyardError::OversizeObject { .. } => 413,
            SwitchyardError::Unsupported(_) => 501,
            SwitchyardError::ConnectFailed(_) => 502,
            _ => 500,
        }
    }

    /// Sanitize the error message to avoid leaking sensitive information
    pub fn sanitized_message(&self) -> String {
        match self {
            // Driver messages can echo hosts and credentials
            SwitchyardError::ConnectFailed(_) => "Failed to connect to the resource".to_string(),

            SwitchyardError::Io(_) | SwitchyardError::Internal(_) => {
                "Internal server error".to_string()
            }

            _ => self.to_string(),
        }
    }
}

/// Result type alias using SwitchyardError
pub type Result<T> = std::result::Result<T, SwitchyardError>;
