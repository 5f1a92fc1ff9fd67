use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::validation::FieldErrors;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Every variant renders as the standard `{"error": ...}` envelope. The
/// payload is a plain message except for [`AppError::Validation`], which
/// carries a map of field name to message.
///
/// Only 5xx variants are logged at `error` level. They are raised inside the
/// request span opened by the trace layer, so the log line carries the
/// method and URI of the failing request.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request body or query (400).
    #[error("{0}")]
    BadRequest(String),

    /// Email/password pair did not match a user (401).
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Bearer token missing its scheme, badly shaped, unknown or expired (401).
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    /// Anonymous caller on a route that needs an identity (401).
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    /// Authenticated but not yet activated (403).
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    /// Authenticated and active, but lacking the route's permission (403).
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    /// Unknown route or record id (404).
    #[error("the requested resource could not be found")]
    NotFound,

    /// Known path, unsupported method (405).
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    /// Optimistic concurrency version mismatch (409).
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// Unique-key violation surfaced to the client (409).
    #[error("{0}")]
    Conflict(String),

    /// One or more field-level validation failures (422).
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),

    /// Per-client rate limit exhausted (429).
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Anything unexpected; details are logged, never returned (500).
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Invalid configuration, only raised at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Message returned for every 500, whatever the cause.
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorPayload<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ErrorPayload<'a> {
    Message(String),
    Fields(&'a FieldErrors),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials
            | AppError::InvalidAuthenticationToken
            | AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::InactiveAccount | AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::EditConflict | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build a single-field validation error.
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(key.to_string(), message.to_string());
        AppError::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let payload = match &self {
            AppError::Validation(fields) => ErrorPayload::Fields(fields),
            AppError::Internal(_) | AppError::ConfigError(_) => {
                // Log the full error details server-side, expose a fixed message
                tracing::error!(error = %self, "Request failed");
                ErrorPayload::Message(SERVER_ERROR_MESSAGE.to_string())
            }
            other => ErrorPayload::Message(other.to_string()),
        };

        let mut response = (status, axum::Json(ErrorResponse { error: payload })).into_response();

        if matches!(self, AppError::InvalidAuthenticationToken) {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

/// Render a JSON syntax/data error as a client-facing message.
///
/// Serde errors contain internal type names; only the position and the
/// offending field name are passed through.
pub(crate) fn describe_json_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("unknown field")
        && let Some(field) = backtick_quoted(&msg)
    {
        return format!("body contains unknown key \"{field}\"");
    }

    if msg.contains("missing field")
        && let Some(field) = backtick_quoted(&msg)
    {
        return format!("body is missing required key \"{field}\"");
    }

    match e.classify() {
        serde_json::error::Category::Eof if e.line() == 1 && e.column() == 0 => {
            "the body must not be empty".to_string()
        }
        serde_json::error::Category::Eof => "the body contains badly-formed JSON".to_string(),
        serde_json::error::Category::Syntax => format!(
            "the body contains badly-formed JSON (at line {} column {})",
            e.line(),
            e.column()
        ),
        serde_json::error::Category::Data => {
            if let Some(field) = backtick_quoted(&msg) {
                format!("the body contains the incorrect JSON type for \"{field}\"")
            } else {
                format!(
                    "the body contains the incorrect JSON type (at line {} column {})",
                    e.line(),
                    e.column()
                )
            }
        }
        serde_json::error::Category::Io => "the body could not be read".to_string(),
    }
}

fn backtick_quoted(msg: &str) -> Option<&str> {
    let start = msg.find('`')?;
    let rest = msg.get(start + 1..)?;
    let end = rest.find('`')?;
    rest.get(..end)
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
