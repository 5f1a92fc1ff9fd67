//! Request ID generation for log correlation.
//!
//! Installed through tower-http's `SetRequestIdLayer` and
//! `PropagateRequestIdLayer`: a client-supplied `X-Request-Id` is kept,
//! otherwise one is generated here, and the same value is echoed on the
//! response.

use axum::http::{HeaderValue, Request};
use rand::Rng;
use tower_http::request_id::{MakeRequestId, RequestId};

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generates 128-bit random request IDs rendered as 32 hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRandomRequestId;

impl MakeRandomRequestId {
    fn generate() -> String {
        format!("{:032x}", rand::rng().random::<u128>())
    }
}

impl MakeRequestId for MakeRandomRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Self::generate())
            .ok()
            .map(RequestId::new)
    }
}
