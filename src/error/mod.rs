//! Error types for Colloquy.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::delta::DeltaError;

/// Primary error type for all orchestration operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Malformed delta: {0}")]
    Delta(#[from] DeltaError),

    #[error("Tool '{name}' is not registered")]
    UnresolvedTool { name: String },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Canceled")]
    Canceled,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ColloquyError {
    /// Create an API error from a status code and response body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::Io(_) | Self::Timeout(_) => ErrorCategory::Transport,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Protocol,
            },
            Self::Protocol(_) | Self::Serialization(_) => ErrorCategory::Protocol,
            Self::Precondition(_) | Self::Delta(_) | Self::InvalidState(_) => {
                ErrorCategory::Precondition
            }
            Self::UnresolvedTool { .. } => ErrorCategory::UnresolvedTool,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Canceled => ErrorCategory::Cancellation,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Aborts are not failures and never reach the user-visible error channel.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Whether this error is potentially retryable by the caller.
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Transport | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit | ErrorCategory::Transport | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution | ErrorCategory::UnresolvedTool => {
                RecoverySuggestion::CheckToolRegistry
            }
            ErrorCategory::Cancellation => RecoverySuggestion::None,
            ErrorCategory::Protocol | ErrorCategory::Precondition => {
                RecoverySuggestion::ReportBug
            }
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ColloquyError>;
