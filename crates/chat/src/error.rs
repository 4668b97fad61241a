//! Errors surfaced by chat sessions and the chat service.

use feedloom_core::error::{ProviderError, StoreError, ToolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad caller input; nothing was changed.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("No active connection for session {0}")]
    NoActiveConnection(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_convert() {
        let err: ChatError = ProviderError::ModelNotFound("gemini".into()).into();
        assert_eq!(err.to_string(), "Unknown model type: gemini");
    }

    #[test]
    fn no_active_connection_names_session() {
        let err = ChatError::NoActiveConnection("abc".into());
        assert!(err.to_string().contains("abc"));
    }
}
