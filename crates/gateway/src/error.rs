//! Mapping of domain errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use feedloom_chat::ChatError;
use feedloom_core::error::{ProviderError, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Chat(ChatError),
    Store(StoreError),
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self::Chat(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Chat(e) => match e {
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::NoActiveConnection(_) => StatusCode::CONFLICT,
                ChatError::Provider(ProviderError::ModelNotFound(_)) => StatusCode::BAD_REQUEST,
                ChatError::Provider(ProviderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                ChatError::Provider(_) | ChatError::Tool(_) => StatusCode::BAD_GATEWAY,
                ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(m) | Self::NotFound(m) | Self::Conflict(m) => m.clone(),
            Self::Chat(e) => e.to_string(),
            Self::Store(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_map_to_statuses() {
        let cases = [
            (ChatError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (ChatError::NoActiveConnection("s".into()), StatusCode::CONFLICT),
            (ProviderError::ModelNotFound("x".into()).into(), StatusCode::BAD_REQUEST),
            (ProviderError::Network("down".into()).into(), StatusCode::BAD_GATEWAY),
            (ProviderError::Timeout("600s".into()).into(), StatusCode::GATEWAY_TIMEOUT),
            (StoreError::Storage("disk".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::Chat(err).status(), status);
        }
    }
}
