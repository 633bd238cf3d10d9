//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **PlayerError**: what the stream player itself can report. Only two
//!   caller mistakes are errors (querying frequencies before `connect()` and
//!   handing over a value of the wrong shape). A missing or closed transport
//!   and an interrupted track are *not* errors; those calls are silent no-ops.
//! - **AppError**: what the HTTP layer returns to clients, converted into a
//!   JSON response by the `ResponseError` impl.
//!
//! ## JSON error body:
//! ```json
//! {
//!   "error": {
//!     "type": "not_connected",
//!     "message": "Not connected, please call connect() first",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors raised by [`crate::audio::player::StreamPlayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// A frequency query was made before `connect()` completed.
    NotConnected,

    /// A track id or audio buffer had the wrong shape.
    TypeMismatch(String),

    /// The analysis context could not be built.
    Analysis(String),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::NotConnected => {
                write!(f, "Not connected, please call connect() first")
            }
            PlayerError::TypeMismatch(msg) => write!(f, "Type mismatch: {}", msg),
            PlayerError::Analysis(msg) => write!(f, "Analysis error: {}", msg),
        }
    }
}

impl std::error::Error for PlayerError {}

/// Errors produced by a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The channel exists but is not in the open state.
    NotOpen,

    /// The writer side of the channel has gone away.
    Closed,

    /// The initial handshake failed.
    Connect(String),

    /// The initial handshake did not finish in time.
    Timeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotOpen => write!(f, "Transport is not open"),
            TransportError::Closed => write!(f, "Transport is closed"),
            TransportError::Connect(msg) => write!(f, "Failed to connect: {}", msg),
            TransportError::Timeout => write!(f, "Timed out while connecting"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors returned from HTTP handlers.
///
/// ## Status code mapping:
/// - Internal/ConfigError → 500
/// - BadRequest/ValidationError → 400
/// - NotFound → 404
/// - NotConnected → 503 (the player has no analysis context yet)
#[derive(Debug)]
pub enum AppError {
    /// Server-side failures
    Internal(String),

    /// Malformed request body or query
    BadRequest(String),

    /// Requested resource does not exist
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Well-formed input with the wrong shape (e.g. float samples)
    ValidationError(String),

    /// Frequency data requested before the analysis context exists
    NotConnected(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotConnected(msg) => write!(f, "Not connected: {}", msg),
        }
    }
}

impl AppError {
    /// Machine-readable error type used in the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::NotFound(_) => "not_found",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
            AppError::NotConnected(_) => "not_connected",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg)
            | AppError::NotConnected(msg) => msg,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::NotConnected(_) => StatusCode::SERVICE_UNAVAILABLE,
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

/// Player errors surface to HTTP clients with the same wording.
impl From<PlayerError> for AppError {
    fn from(err: PlayerError) -> Self {
        match err {
            PlayerError::NotConnected => AppError::NotConnected(err.to_string()),
            PlayerError::TypeMismatch(_) => AppError::ValidationError(err.to_string()),
            PlayerError::Analysis(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are the client's fault, so they become 400s.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>` in handlers.
pub type AppResult<T> = Result<T, AppError>;
