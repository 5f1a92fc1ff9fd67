//! Converts a panic anywhere below this layer into a single 500.
//!
//! The connection is marked `Connection: close` since the handler that
//! panicked may have left it in an unknown state.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::Json;
use axum::extract::Request;
use axum::http::header::CONNECTION;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use serde_json::json;
use tracing::error;

use crate::error::SERVER_ERROR_MESSAGE;
use crate::metrics;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

/// Panic guard middleware, installed with `from_fn`.
pub async fn recover_panic(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            error!(
                method = %method,
                uri = %uri,
                panic = panic_message(payload.as_ref()),
                "Handler panicked"
            );
            metrics::record_panic_recovered();

            let mut response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": SERVER_ERROR_MESSAGE })),
            )
                .into_response();
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}
