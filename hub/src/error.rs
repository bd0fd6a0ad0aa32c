//! Hub error types.
//!
//! Defines error variants for pool, bridge, dispatch, and lifecycle operations,
//! plus the retryability classification used by the dispatch retry loop.

use std::sync::OnceLock;

use regex::RegexSet;
use thiserror::Error;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Server '{server}' is not available (status: {status})")]
    ServerNotConnected { server: String, status: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("{0}")]
    Group(String),

    #[error("Tool '{tool}' is not accessible in group '{group}'")]
    ToolAccessDenied { tool: String, group: String },

    #[error("{0}")]
    InvalidArguments(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Tool execution failed after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("API tool error: {0}")]
    ApiTool(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Hub is shutting down")]
    ShuttingDown,

    #[error("Lifecycle errors: {}", .0.join("; "))]
    Lifecycle(Vec<String>),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Message patterns that mark an execution error as transient.
fn retryable_patterns() -> &'static RegexSet {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"(?i)connection",
            r"(?i)timeout",
            r"(?i)network",
            r"(?i)temporary",
            r"(?i)unavailable",
        ])
        .expect("static retryable patterns")
    })
}

impl HubError {
    /// Whether the dispatch retry loop may re-attempt after this error.
    ///
    /// Access, validation, and not-found errors are never retried no matter
    /// what their message says. Everything else is retried only when the
    /// message matches one of the transient patterns.
    pub fn is_retryable(&self) -> bool {
        match self {
            HubError::Config(_)
            | HubError::ServerNotFound(_)
            | HubError::ToolNotFound(_)
            | HubError::GroupNotFound(_)
            | HubError::Group(_)
            | HubError::ToolAccessDenied { .. }
            | HubError::InvalidArguments(_)
            | HubError::Cancelled
            | HubError::ShuttingDown
            | HubError::Lifecycle(_) => false,
            HubError::Timeout(_) => true,
            other => retryable_patterns().is_match(&other.to_string()),
        }
    }

    /// Short machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Config(_) => "config_error",
            HubError::ServerNotFound(_) => "server_not_found",
            HubError::ServerNotConnected { .. } => "server_not_connected",
            HubError::ToolNotFound(_) => "tool_not_found",
            HubError::GroupNotFound(_) => "group_not_found",
            HubError::Group(_) => "group_error",
            HubError::ToolAccessDenied { .. } => "tool_access_denied",
            HubError::InvalidArguments(_) => "invalid_arguments",
            HubError::ConnectionFailed(_) => "connection_failed",
            HubError::Transport(_) => "transport_error",
            HubError::ToolExecution(_) => "tool_execution_failed",
            HubError::RetriesExhausted { .. } => "tool_execution_failed",
            HubError::ApiTool(_) => "api_tool_error",
            HubError::Timeout(_) => "timeout",
            HubError::Cancelled => "cancelled",
            HubError::ShuttingDown => "shutting_down",
            HubError::Lifecycle(_) => "lifecycle_error",
            HubError::Internal(_) => "internal_error",
            HubError::Io(_) => "io_error",
            HubError::Http(_) => "http_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_messages_are_retryable() {
        assert!(HubError::ToolExecution("Connection timeout".into()).is_retryable());
        assert!(HubError::Transport("network unreachable".into()).is_retryable());
        assert!(HubError::ToolExecution("service Temporarily Unavailable".into()).is_retryable());
    }

    #[test]
    fn test_non_transient_messages_are_not_retryable() {
        assert!(!HubError::ToolExecution("Invalid arguments".into()).is_retryable());
        assert!(!HubError::ToolExecution("schema mismatch".into()).is_retryable());
    }

    #[test]
    fn test_access_errors_never_retry() {
        // Message contains "connection" but the variant wins.
        assert!(!HubError::InvalidArguments("connection field missing".into()).is_retryable());
        assert!(!HubError::ToolAccessDenied {
            tool: "network_scan".into(),
            group: "default".into(),
        }
        .is_retryable());
        assert!(!HubError::ToolNotFound("connection_tool".into()).is_retryable());
    }

    #[test]
    fn test_timeout_variant_is_always_retryable() {
        assert!(HubError::Timeout("initialize deadline".into()).is_retryable());
    }
}
