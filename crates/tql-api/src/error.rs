//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tql_core::TqlError;
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unresolved CURIE: {0}")]
    UnresolvedCurie(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("Query execution failed: {0}")]
    QueryFailed(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::UnresolvedCurie(_)
            | AppError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            AppError::QueryFailed(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            tracing::warn!("Rejected request: {}", self);
        } else {
            tracing::error!("Request failed: {}", self);
        }

        let error = match self {
            AppError::NotFound(msg) => ApiError::not_found(&msg),
            AppError::BadRequest(msg) => ApiError::bad_request(msg),
            err @ AppError::UnresolvedCurie(_) => {
                ApiError::new("UNRESOLVED_CURIE", err.to_string())
            }
            err @ AppError::MissingParameter(_) => {
                ApiError::new("MISSING_PARAMETER", err.to_string())
            }
            AppError::QueryFailed(msg) => {
                ApiError::new("QUERY_FAILED", "Query execution failed").with_details(msg)
            }
            AppError::Internal(msg) => ApiError::internal_error().with_details(msg),
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<TqlError> for AppError {
    fn from(err: TqlError) -> Self {
        match err {
            TqlError::UnresolvedCurie(curie) => AppError::UnresolvedCurie(curie),
            TqlError::MissingParameter(name) => AppError::MissingParameter(name),
            TqlError::QueryExecutionFailed(msg) => AppError::QueryFailed(msg),
            TqlError::InvalidGraph(msg) => AppError::Internal(format!("Invalid graph: {msg}")),
            TqlError::ConfigError(msg) => {
                AppError::Internal(format!("Configuration error: {msg}"))
            }
            TqlError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        let err: AppError = TqlError::UnresolvedCurie("Y:foo".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err: AppError = TqlError::MissingParameter("id".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_server_errors_map_to_500() {
        let err: AppError = TqlError::QueryExecutionFailed("boom".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: AppError = TqlError::InvalidGraph("bad".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            AppError::UnresolvedCurie("Y:foo".into()).to_string(),
            "Unresolved CURIE: Y:foo"
        );
        assert_eq!(
            AppError::MissingParameter("rel_id".into()).to_string(),
            "Missing parameter: rel_id"
        );
        let err: AppError = TqlError::QueryExecutionFailed("boom".into()).into();
        assert_eq!(err.to_string(), "Query execution failed: boom");
    }
}
