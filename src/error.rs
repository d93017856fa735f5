//! # Error Handling
//!
//! This module provides unified error handling for the Intel Bridge API,
//! implementing the standard `{success, error, timestamp, requestId}`
//! response envelope with request-id propagation. Failure kinds are tagged
//! at the point of failure and mapped to HTTP statuses here, never inferred
//! later from message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::crypto::CryptoError;
use crate::intel::{UpstreamError, UpstreamErrorKind};
use crate::telemetry;
use crate::token_store::TokenStoreError;

/// Unified API error carrying the HTTP status and machine-readable code.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Box<str>,
    pub message: Box<str>,
    pub details: Option<Box<serde_json::Value>>,
    pub request_id: Option<Box<str>>,
}

/// Machine-readable error body nested inside the failure envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Failure response envelope shared by every JSON endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorDetail,
    /// ISO-8601 response timestamp
    pub timestamp: String,
    /// Opaque per-request correlation string
    pub request_id: String,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            request_id: telemetry::current_request_id().map(String::into_boxed_str),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Validation failed")]
    Validation,
    #[error("Authentication required")]
    Authentication,
    #[error("Token expired")]
    TokenExpired,
    #[error("Not found")]
    NotFound,
    #[error("Report not found")]
    ReportNotFound,
    #[error("Too many requests")]
    RateLimited,
    #[error("Upstream service error")]
    Upstream,
    #[error("Security validation failed")]
    Security,
    #[error("Internal server error")]
    Internal,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::Validation => StatusCode::BAD_REQUEST,
            ErrorType::Authentication => StatusCode::UNAUTHORIZED,
            ErrorType::TokenExpired => StatusCode::UNAUTHORIZED,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::ReportNotFound => StatusCode::NOT_FOUND,
            ErrorType::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorType::Upstream => StatusCode::BAD_GATEWAY,
            ErrorType::Security => StatusCode::FORBIDDEN,
            ErrorType::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::Validation => "VALIDATION_FAILED",
            ErrorType::Authentication => "UNAUTHORIZED",
            ErrorType::TokenExpired => "TOKEN_EXPIRED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::ReportNotFound => "REPORT_NOT_FOUND",
            ErrorType::RateLimited => "RATE_LIMITED",
            ErrorType::Upstream => "UPSTREAM_ERROR",
            ErrorType::Security => "SECURITY_ERROR",
            ErrorType::Internal => "INTERNAL_ERROR",
        }
    }

    /// Build an [`ApiError`] with this type's status/code and a custom message.
    pub fn with_message<S: Into<String>>(self, message: S) -> ApiError {
        ApiError::new(self.status_code(), self.error_code().to_string(), message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self
            .request_id
            .map(String::from)
            .or_else(telemetry::current_request_id)
            .unwrap_or_else(telemetry::generate_request_id);

        let envelope = ErrorEnvelope {
            success: false,
            error: ErrorDetail {
                code: self.code.into_string(),
                message: self.message.into_string(),
                details: self.details.map(|d| *d),
            },
            timestamp: Utc::now().to_rfc3339(),
            request_id,
        };

        (self.status, axum::Json(envelope)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        let message = error_type.to_string();
        error_type.with_message(message)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Internal error: {:?}", error);

        ErrorType::Internal.with_message("An internal error occurred")
    }
}

impl From<CryptoError> for ApiError {
    fn from(error: CryptoError) -> Self {
        // The variant names carry no secret material; plaintext and key never do
        tracing::error!(error = %error, "Crypto operation failed");

        ErrorType::Internal.with_message("An internal error occurred")
    }
}

impl From<TokenStoreError> for ApiError {
    fn from(error: TokenStoreError) -> Self {
        tracing::error!(error = %error, "Token store operation failed");

        ErrorType::Internal.with_message("Failed to access authentication state")
    }
}

impl From<UpstreamError> for ApiError {
    fn from(error: UpstreamError) -> Self {
        tracing::warn!(kind = ?error.kind, message = %error.message, "Upstream request failed");

        match error.kind {
            UpstreamErrorKind::Unauthorized => ErrorType::Authentication
                .with_message("Authentication required. Please reconnect your account."),
            UpstreamErrorKind::NotFound => {
                ErrorType::ReportNotFound.with_message("The requested report could not be found.")
            }
            UpstreamErrorKind::RateLimited => {
                ErrorType::RateLimited.with_message("Upstream rate limit exceeded. Please retry later.")
            }
            UpstreamErrorKind::Timeout
            | UpstreamErrorKind::Network
            | UpstreamErrorKind::Server { .. } => {
                ErrorType::Upstream.with_message("Upstream service is unavailable. Please try again.")
            }
            UpstreamErrorKind::Client { .. } | UpstreamErrorKind::Envelope => {
                ErrorType::Internal.with_message("Upstream request failed. Please try again.")
            }
        }
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "VALIDATION_FAILED".to_string(),
        message.to_string(),
    )
    .with_details(field_errors)
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ErrorType::Authentication.with_message(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert!(error.details.is_none());
    }

    #[test]
    fn test_error_type_mapping() {
        let token_expired: ApiError = ErrorType::TokenExpired.into();
        assert_eq!(token_expired.status, StatusCode::UNAUTHORIZED);
        assert_eq!(token_expired.code, Box::from("TOKEN_EXPIRED"));

        let rate_limited: ApiError = ErrorType::RateLimited.into();
        assert_eq!(rate_limited.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rate_limited.code, Box::from("RATE_LIMITED"));

        let security: ApiError = ErrorType::Security.into();
        assert_eq!(security.status, StatusCode::FORBIDDEN);
        assert_eq!(security.code, Box::from("SECURITY_ERROR"));
    }

    #[test]
    fn test_from_anyhow() {
        let anyhow_error = anyhow::anyhow!("Something went wrong");
        let api_error: ApiError = anyhow_error.into();

        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.code, Box::from("INTERNAL_ERROR"));
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn test_upstream_error_mapping_by_kind() {
        let unauthorized: ApiError = UpstreamError::new(
            UpstreamErrorKind::Unauthorized,
            "upstream rejected credentials",
        )
        .into();
        assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unauthorized.code, Box::from("UNAUTHORIZED"));

        let not_found: ApiError =
            UpstreamError::new(UpstreamErrorKind::NotFound, "no such report").into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.code, Box::from("REPORT_NOT_FOUND"));

        let rate_limited: ApiError =
            UpstreamError::new(UpstreamErrorKind::RateLimited, "slow down").into();
        assert_eq!(rate_limited.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rate_limited.code, Box::from("RATE_LIMITED"));

        let server: ApiError =
            UpstreamError::new(UpstreamErrorKind::Server { status: 503 }, "boom").into();
        assert_eq!(server.status, StatusCode::BAD_GATEWAY);
        assert_eq!(server.code, Box::from("UPSTREAM_ERROR"));

        let timeout: ApiError = UpstreamError::new(UpstreamErrorKind::Timeout, "deadline").into();
        assert_eq!(timeout.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_validation_error_with_details() {
        let field_errors = json!(["Portal ID is required"]);

        let error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.details, Some(Box::new(field_errors)));
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        use axum::body::to_bytes;

        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Bad input");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["code"], json!("VALIDATION_FAILED"));
        assert!(value["timestamp"].is_string());
        assert!(
            value["requestId"]
                .as_str()
                .is_some_and(|id| id.starts_with("req-"))
        );
    }

    #[test]
    fn test_unauthorized_helper() {
        let error = unauthorized(None);
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(error.message, Box::from("Authentication required"));

        let custom = unauthorized(Some("Please reconnect your account."));
        assert_eq!(custom.message, Box::from("Please reconnect your account."));
    }
}
