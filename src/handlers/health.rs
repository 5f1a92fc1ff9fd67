//! Healthcheck and in-process metrics endpoints.
//!
//! # Endpoints
//!
//! - `GET /v1/healthcheck` - Liveness with environment and version
//! - `GET /v1/observability/course/metrics` - Request counters and task count
//!
//! Both are public and never touch the store.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::instrument;

use crate::state::AppState;

/// Healthcheck endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "available",
///   "system_info": { "environment": "development", "version": "0.1.0" }
/// }
/// ```
#[instrument(skip(state))]
pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.environment,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

/// Counters collected by the metrics stage.
///
/// `tasks` is the number of live Tokio tasks, which includes in-flight
/// requests and background work.
#[instrument(skip(state))]
pub async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let tasks = tokio::runtime::Handle::current().metrics().num_alive_tasks();

    Json(json!({
        "tasks": tasks,
        "timestamp": Utc::now().timestamp(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.uptime_seconds(),
        "requests": state.metrics.snapshot(),
    }))
}
