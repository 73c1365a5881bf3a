//! Error types for imessage-mcp

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for imessage-mcp operations
pub type Result<T> = std::result::Result<T, IMessageError>;

/// Main error type for imessage-mcp
#[derive(Error, Debug)]
pub enum IMessageError {
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Automation error: {0}")]
    Automation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// The stable error taxonomy surfaced to tool callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unavailable,
    NotFound,
    InvalidState,
    InvalidArgument,
    Automation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Automation => "automation",
        };
        f.write_str(s)
    }
}

impl IMessageError {
    /// Classify the error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            IMessageError::Unavailable(_) => ErrorKind::Unavailable,
            IMessageError::NotFound(_) => ErrorKind::NotFound,
            IMessageError::InvalidState(_) => ErrorKind::InvalidState,
            IMessageError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            IMessageError::Automation(_) => ErrorKind::Automation,
            // chat.db is owned by another process; any SQL failure means we
            // could not read it in the shape we expect.
            IMessageError::Database(_) => ErrorKind::Unavailable,
            IMessageError::Serialization(_) => ErrorKind::InvalidArgument,
            IMessageError::Config(_) => ErrorKind::InvalidArgument,
            IMessageError::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::NotFound,
                std::io::ErrorKind::AlreadyExists | std::io::ErrorKind::InvalidInput => {
                    ErrorKind::InvalidArgument
                }
                _ => ErrorKind::Unavailable,
            },
        }
    }

    /// Get error code for MCP protocol
    pub fn code(&self) -> i64 {
        match self.kind() {
            ErrorKind::NotFound => -32001,
            ErrorKind::InvalidState => -32002,
            ErrorKind::Unavailable => -32003,
            ErrorKind::Automation => -32004,
            ErrorKind::InvalidArgument => -32602,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_are_unavailable() {
        let err = IMessageError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = IMessageError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), -32001);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let v = serde_json::to_value(ErrorKind::InvalidArgument).unwrap();
        assert_eq!(v, serde_json::json!("invalid_argument"));
        assert_eq!(ErrorKind::InvalidState.to_string(), "invalid_state");
    }
}
