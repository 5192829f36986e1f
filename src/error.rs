//! Error types for Portico
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// No client instance registered for the correlation id (404)
    ///
    /// Raised by the callback path when the browser session carries no
    /// correlation cookie, or when the registry entry has expired.
    #[error("No pending authorization for this session")]
    UnknownCorrelation,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// State nonce from the provider redirect does not match (401)
    #[error("Authorization state mismatch")]
    StateMismatch,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Hosted provider rejected or failed an operation (502)
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing/verification error (500)
    #[error("Signing error: {0}")]
    Signing(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::UnknownCorrelation => (
                StatusCode::NOT_FOUND,
                self.to_string(),
                "unknown_correlation",
            ),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::StateMismatch => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "state_mismatch")
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Provider(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), "provider"),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "http_client"),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Signing(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "signing"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
