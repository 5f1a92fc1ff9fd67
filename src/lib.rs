//! # Training Records API
//!
//! JSON REST service for in-service training: staff accounts, roles,
//! courses and their postings, training sessions, trainee enrolments,
//! attendance and facilitator ratings.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request ID → Trace                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (Metrics → Panic Guard → CORS → Rate Limit → Auth)│
//! ├─────────────────────────────────────────────────────────────┤
//! │  Router → RequirePermission → Handlers                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Store (in-process tables, filter/sort/paginate contract)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use training_records::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config);
//!     state.seed_admin().await?;
//!     let app = build_router(state);
//!
//!     // Serve with `into_make_service_with_connect_info::<SocketAddr>()`...
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Tighten the per-IP limiter:
//! ```bash
//! LIMITER_RPS=1 LIMITER_BURST=3 cargo run
//! ```
//!
//! Seed an administrator holding every permission:
//! ```bash
//! ADMIN_EMAIL=admin@example.com ADMIN_PASSWORD=change-me-now cargo run
//! ```

pub mod config;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
