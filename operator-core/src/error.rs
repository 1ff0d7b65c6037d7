//! Error types for the console

use thiserror::Error;

/// Console-wide error type
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsoleError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        ConsoleError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        ConsoleError::Network(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ConsoleError::Transport(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        ConsoleError::Parse(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ConsoleError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ConsoleError::Internal(msg.into())
    }

    /// Short text suitable for showing to the operator
    pub fn operator_text(&self) -> String {
        match self {
            ConsoleError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        ConsoleError::Parse(err.to_string())
    }
}

/// Result type alias for console operations
pub type ConsoleResult<T> = Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_text_uses_api_detail() {
        let err = ConsoleError::api(400, "Bot not running");
        assert_eq!(err.operator_text(), "Bot not running");
        assert_eq!(err.to_string(), "API error (400): Bot not running");
    }

    #[test]
    fn test_operator_text_other_variants() {
        let err = ConsoleError::network("connection refused");
        assert_eq!(err.operator_text(), "Network error: connection refused");
    }
}
