//! Error types for the feedloom domain.
//!
//! Each bounded context (model backends, storage, tools) has its own enum;
//! `Error` rolls them up for callers that cross contexts.

use thiserror::Error;

/// The top-level error type for feedloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Unknown model type: {0}")]
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

/// Failures of the vector index, the preference database, or the embedder
/// behind them. Never retried by the core.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool backend unreachable: {0}")]
    Transport(String),

    #[error("Tool backend protocol error {code}: {message}")]
    Protocol { code: i64, message: String },
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
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "search_feeds".into(),
            reason: "index offline".into(),
        });
        assert!(err.to_string().contains("search_feeds"));
        assert!(err.to_string().contains("index offline"));
    }

    #[test]
    fn store_error_converts_into_top_level() {
        let err: Error = StoreError::QueryFailed("no such table".into()).into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("no such table"));
    }
}
