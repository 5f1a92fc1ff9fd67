//! The request pipeline wrapped around the router.
//!
//! # Architecture
//!
//! ```text
//! Request
//!    │
//!    ▼
//! Metrics ─▶ Panic Guard ─▶ CORS ─▶ Rate Limit ─▶ Authenticate ─▶ Router
//!    │           │            │          │              │            │
//!  counters     500      preflight     429           401      RequirePermission
//!                          200                                 401/403 ─▶ handler
//! ```
//!
//! [`PIPELINE`] is the single source of the stage order, outermost first.
//! Per-route permission checks live in [`permission`] and are attached with
//! `route_layer` when routes are declared.

pub mod auth;
pub mod cors;
pub mod metrics;
pub mod panic_guard;
pub mod permission;
pub mod rate_limit;
pub mod request_id;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};

pub use auth::{AuthenticateLayer, Identity};
pub use cors::TrustedOrigins;
pub use permission::RequirePermission;
pub use rate_limit::{ClientRateLimiter, RateLimit, RateLimitLayer};
pub use request_id::MakeRandomRequestId;

use crate::state::AppState;

/// One stage of the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metrics,
    PanicGuard,
    Cors,
    RateLimit,
    Authenticate,
}

/// Pipeline stages, outermost first.
pub const PIPELINE: [Stage; 5] = [
    Stage::Metrics,
    Stage::PanicGuard,
    Stage::Cors,
    Stage::RateLimit,
    Stage::Authenticate,
];

impl Stage {
    fn wrap(self, router: Router, state: &AppState) -> Router {
        match self {
            Stage::Metrics => router.layer(from_fn_with_state(
                state.metrics.clone(),
                metrics::track_metrics,
            )),
            Stage::PanicGuard => router.layer(from_fn(panic_guard::recover_panic)),
            Stage::Cors => router.layer(from_fn_with_state(
                state.trusted_origins.clone(),
                cors::cors,
            )),
            Stage::RateLimit => router.layer(match &state.rate_limiter {
                Some(limiter) => RateLimitLayer::new(limiter.clone()),
                None => RateLimitLayer::disabled(),
            }),
            Stage::Authenticate => router.layer(AuthenticateLayer::new(state.db.clone())),
        }
    }
}

/// Wrap `router` in every [`PIPELINE`] stage.
///
/// Layers added later run first, so the list is applied innermost first.
pub fn apply_pipeline(router: Router, state: &AppState) -> Router {
    PIPELINE
        .iter()
        .rev()
        .fold(router, |router, stage| stage.wrap(router, state))
}
