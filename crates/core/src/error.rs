//! Error types for the Mnemon domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant; `ErrorKind` is the flat
//! taxonomy that crosses the wire to clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The flat error taxonomy exposed to clients.
///
/// Every internal error maps to exactly one of these kinds. Loop-bound
/// violations are persisted on the failing assistant message so a completed
/// turn always carries its failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Unauthorized,
    ProviderTransient,
    ProviderPermanent,
    ToolError,
    ToolTimeout,
    StepLimit,
    ToolLimit,
    TurnTimeout,
    BudgetExceeded,
    ContextOverflowFixed,
    SummarizationFailed,
    StorageError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::ProviderTransient => "provider_transient",
            Self::ProviderPermanent => "provider_permanent",
            Self::ToolError => "tool_error",
            Self::ToolTimeout => "tool_timeout",
            Self::StepLimit => "step_limit",
            Self::ToolLimit => "tool_limit",
            Self::TurnTimeout => "turn_timeout",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ContextOverflowFixed => "context_overflow_fixed",
            Self::SummarizationFailed => "summarization_failed",
            Self::StorageError => "storage_error",
        };
        write!(f, "{s}")
    }
}

/// The top-level error type for all Mnemon operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Conversation / version storage ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Validation before any model call ---
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // --- Context assembly ---
    #[error("Fixed context ({fixed_tokens} tokens) exceeds 90% of window ({window} tokens)")]
    ContextOverflowFixed { fixed_tokens: usize, window: usize },

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map to the wire taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(p) => p.kind(),
            Self::Memory(_) => ErrorKind::StorageError,
            Self::Storage(s) => s.kind(),
            Self::Tool(t) => t.kind(),
            Self::InvalidRequest { .. } | Self::Config { .. } | Self::Serialization(_) => {
                ErrorKind::InvalidRequest
            }
            Self::ContextOverflowFixed { .. } => ErrorKind::ContextOverflowFixed,
            Self::SummarizationFailed(_) => ErrorKind::SummarizationFailed,
            Self::Internal(_) => ErrorKind::StorageError,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether the reasoning loop should retry this error with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_transient() {
            ErrorKind::ProviderTransient
        } else if matches!(self, Self::AuthenticationFailed(_)) {
            ErrorKind::Unauthorized
        } else {
            ErrorKind::ProviderPermanent
        }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Memory item not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Block '{label}' is read-only")]
    ReadOnlyBlock { label: String },

    #[error("Block '{label}' value ({len} chars) exceeds limit ({limit} chars)")]
    BlockOverLimit { label: String, len: usize, limit: usize },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl StorageError {
    /// Block-limit and read-only violations are client errors, not outages.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::ReadOnlyBlock { .. } | Self::BlockOverLimit { .. } => {
                ErrorKind::InvalidRequest
            }
            _ => ErrorKind::StorageError,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Invalid tool schema for {tool_name}: {reason}")]
    InvalidSchema { tool_name: String, reason: String },
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::ToolTimeout,
            _ => ErrorKind::ToolError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::ApiError { status_code: 503, message: "down".into() }.is_transient());
        assert!(!ProviderError::ApiError { status_code: 400, message: "bad".into() }.is_transient());
        assert!(!ProviderError::AuthenticationFailed("no key".into()).is_transient());
    }

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(
            Error::Provider(ProviderError::Timeout("t".into())).kind(),
            ErrorKind::ProviderTransient
        );
        assert_eq!(
            Error::Provider(ProviderError::AuthenticationFailed("k".into())).kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            Error::Tool(ToolError::Timeout { tool_name: "t".into(), timeout_secs: 30 }).kind(),
            ErrorKind::ToolTimeout
        );
        assert_eq!(
            Error::ContextOverflowFixed { fixed_tokens: 10_000, window: 8_192 }.kind(),
            ErrorKind::ContextOverflowFixed
        );
        assert_eq!(
            StorageError::BlockOverLimit { label: "human".into(), len: 10, limit: 5 }.kind(),
            ErrorKind::InvalidRequest
        );
        // The top-level mapping defers to the storage error's own kind.
        assert_eq!(
            Error::Storage(StorageError::NotFound("agent ghost".into())).kind(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            Error::Storage(StorageError::Connection("db gone".into())).kind(),
            ErrorKind::StorageError
        );
    }

    #[test]
    fn error_kind_wire_names() {
        assert_eq!(ErrorKind::StepLimit.to_string(), "step_limit");
        assert_eq!(ErrorKind::BudgetExceeded.to_string(), "budget_exceeded");
        assert_eq!(
            serde_json::to_string(&ErrorKind::ContextOverflowFixed).unwrap(),
            "\"context_overflow_fixed\""
        );
    }
}
