//! # Error Handling
//!
//! HTTP-facing error type for the service's JSON endpoints.
//!
//! ## Two layers of errors:
//! - **PipelineError** (in `transcription::result`): what went wrong while turning
//!   audio into text. These never become HTTP errors; the speech-to-text endpoint
//!   folds them into a `200 OK` body with `success: false`.
//! - **AppError** (this module): what went wrong while serving a request
//!   (bad multipart body, oversized upload, unknown route). These map to
//!   4xx responses through `ResponseError`; the upload endpoint reports them
//!   in-body instead.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "payload_too_large",
//!     "message": "Upload exceeds 52428800 bytes",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Request-level failures.
///
/// ## Status Mapping:
/// - BadRequest → 400
/// - PayloadTooLarge → 413
/// - NotFound → 404
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Machine-readable error type used in the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::NotFound(_) => "not_found",
        }
    }

    /// Message without the display prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg) | AppError::PayloadTooLarge(msg) | AppError::NotFound(msg) => msg,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Malformed multipart bodies are the client's fault.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Multipart error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
