//! Shared extractors and response helpers for handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, FailedToBufferBody};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header::LOCATION;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult, describe_json_error};
use crate::filters::QueryParams;

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 256_000;

/// JSON request body with strict decoding.
///
/// Rejects (400) empty bodies, malformed JSON, trailing data after the first
/// value, unknown keys (via `deny_unknown_fields` on `T`), wrong types and
/// bodies over [`MAX_BODY_BYTES`].
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| match rejection {
                BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_)) => {
                    AppError::BadRequest(format!(
                        "the body must not be larger than {MAX_BODY_BYTES} bytes"
                    ))
                }
                other => AppError::BadRequest(other.body_text()),
            })?;

        decode_body(&bytes).map(JsonBody)
    }
}

/// Decode exactly one JSON value from `bytes` into `T`.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> AppResult<T> {
    // Syntax and single-value checks run before any field is looked at.
    let mut de = serde_json::Deserializer::from_slice(bytes);
    IgnoredAny::deserialize(&mut de).map_err(|e| AppError::BadRequest(describe_json_error(&e)))?;
    de.end().map_err(|_| {
        AppError::BadRequest("the body must only contain a single JSON value".to_string())
    })?;

    serde_json::from_slice(bytes).map_err(|e| AppError::BadRequest(describe_json_error(&e)))
}

/// Positive integer id from the `{id}` path segment.
///
/// Anything else is reported as 404, as the path names no resource.
#[derive(Debug, Clone, Copy)]
pub struct ResourceId(pub i64);

impl<S> FromRequestParts<S> for ResourceId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::NotFound)?;

        raw.parse::<i64>()
            .ok()
            .filter(|id| *id >= 1)
            .map(ResourceId)
            .ok_or(AppError::NotFound)
    }
}

impl<S> FromRequestParts<S> for QueryParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<QueryParams>::from_request_parts(parts, state)
            .await
            .map(|Query(params)| params)
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
    }
}

/// Header a client uses to name the record version its update is based on.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

/// Optional `X-Expected-Version` of a versioned update.
///
/// When present, the write succeeds only if the stored record still has
/// this version. A value that is not an integer is a 400.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpectedVersion(pub Option<i32>);

impl<S> FromRequestParts<S> for ExpectedVersion
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(EXPECTED_VERSION_HEADER) else {
            return Ok(Self(None));
        };

        raw.to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i32>().ok())
            .map(|version| Self(Some(version)))
            .ok_or_else(|| {
                AppError::BadRequest("the X-Expected-Version header must be an integer".to_string())
            })
    }
}

/// 201 with a `Location` header and the given envelope.
pub fn created(location: String, body: Value) -> Response {
    let mut response = (StatusCode::CREATED, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}
