//! Cross-origin gate for a fixed list of trusted origins.
//!
//! Only exact origin matches receive `Access-Control-Allow-Origin`. A
//! preflight from a trusted origin is answered here and never reaches the
//! router. Every response varies on `Origin` and
//! `Access-Control-Request-Method`, whether or not CORS headers were added.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

/// Methods advertised to a trusted preflight.
pub const ALLOWED_METHODS: &str = "OPTIONS, PUT, PATCH, DELETE";

/// Request headers advertised to a trusted preflight.
pub const ALLOWED_HEADERS: &str = "Authorization, Content-Type";

/// Origins allowed to read responses.
#[derive(Debug, Clone, Default)]
pub struct TrustedOrigins(Arc<Vec<String>>);

impl TrustedOrigins {
    pub fn new(origins: Vec<String>) -> Self {
        Self(Arc::new(origins))
    }

    /// The request's `Origin` when it is trusted.
    fn matching(&self, headers: &HeaderMap) -> Option<HeaderValue> {
        let origin = headers.get(ORIGIN)?;
        let value = origin.to_str().ok()?;
        self.0
            .iter()
            .any(|trusted| trusted == value)
            .then(|| origin.clone())
    }
}

fn add_vary(headers: &mut HeaderMap) {
    headers.append(VARY, HeaderValue::from_static("Origin"));
    headers.append(VARY, HeaderValue::from_static("Access-Control-Request-Method"));
}

/// CORS middleware, installed with `from_fn_with_state`.
pub async fn cors(State(trusted): State<TrustedOrigins>, request: Request, next: Next) -> Response {
    let Some(origin) = trusted.matching(request.headers()) else {
        let mut response = next.run(request).await;
        add_vary(response.headers_mut());
        return response;
    };

    let is_preflight = request.method() == Method::OPTIONS
        && request.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = if is_preflight {
        debug!(origin = ?origin, "Answering CORS preflight");
        let mut preflight = StatusCode::OK.into_response();
        let headers = preflight.headers_mut();
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        preflight
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    add_vary(headers);
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    response
}
