//! Error classification and recovery.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Network failure reaching the backend or a tool endpoint.
    Transport,
    Authentication,
    RateLimit,
    Server,
    /// Malformed or unexpected backend payload.
    Protocol,
    /// Malformed delta patch or a workflow driven out of causal order.
    Precondition,
    UnresolvedTool,
    ToolExecution,
    /// User or system initiated abort; not a failure.
    Cancellation,
    Configuration,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    CheckToolRegistry,
    ReportBug,
    None,
}
