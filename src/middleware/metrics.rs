//! Outermost stage: counts every request and response.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::metrics::RequestMetrics;

/// Metrics middleware, installed with `from_fn_with_state`.
pub async fn track_metrics(
    State(metrics): State<Arc<RequestMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    metrics.record_received();

    let response = next.run(request).await;

    metrics.record_sent(response.status().as_u16(), start.elapsed());
    response
}
