//! Shared application state for Axum handlers.
//!
//! # Structured Concurrency
//!
//! Background work (welcome mail, the rate limiter and token sweeps) is spawned on a
//! `tokio_util::task::TaskTracker` and observes a `CancellationToken`.
//! [`AppState::shutdown`] cancels the token, closes the tracker and waits for
//! outstanding tasks, bounded by `SHUTDOWN_TIMEOUT_SECS`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::mailer::{LogMailer, Mailer};
use crate::metrics::RequestMetrics;
use crate::middleware::panic_guard::panic_message;
use crate::middleware::{ClientRateLimiter, TrustedOrigins};
use crate::models::{Permission, User, hash_password};
use crate::store::{Database, TOKEN_PURGE_INTERVAL};

/// Shared application state for Axum handlers.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub mailer: Arc<dyn Mailer>,
    /// Counters fed by the metrics stage
    pub metrics: Arc<RequestMetrics>,
    /// `None` when `LIMITER_ENABLED=false`
    pub rate_limiter: Option<Arc<ClientRateLimiter>>,
    pub trusted_origins: TrustedOrigins,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build state with the logging mailer.
    ///
    /// Must be called inside a Tokio runtime: the token and rate limiter
    /// sweeps are spawned immediately.
    pub fn new(config: Config) -> Self {
        let mailer = Arc::new(LogMailer::new(config.smtp_sender.clone()));
        Self::with_mailer(config, mailer)
    }

    pub fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();

        let rate_limiter = if config.limiter_enabled {
            let limiter = ClientRateLimiter::new(config.limiter_rps, config.limiter_burst);
            if limiter.is_none() {
                warn!(
                    rps = config.limiter_rps,
                    burst = config.limiter_burst,
                    "Invalid limiter settings, rate limiting disabled"
                );
            }
            limiter.map(Arc::new)
        } else {
            None
        };

        if let Some(limiter) = &rate_limiter {
            info!(
                rps = config.limiter_rps,
                burst = config.limiter_burst,
                "Rate limiting enabled"
            );
            limiter
                .clone()
                .spawn_sweeper(&task_tracker, cancellation_token.clone());
        } else {
            info!("Rate limiting disabled");
        }

        let db = Arc::new(Database::new());
        spawn_token_sweeper(db.clone(), &task_tracker, cancellation_token.clone());

        Self {
            trusted_origins: TrustedOrigins::new(config.cors_trusted_origins.clone()),
            config: Arc::new(config),
            db,
            mailer,
            metrics: Arc::new(RequestMetrics::new()),
            rate_limiter,
            started_at: Instant::now(),
            task_tracker,
            cancellation_token,
        }
    }

    /// Run `task` in the background, outside the request.
    ///
    /// Errors and panics are logged; they never reach a client.
    pub fn background<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.task_tracker.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => debug!(task = name, "Background task finished"),
                Ok(Err(e)) => error!(task = name, error = %format!("{e:#}"), "Background task failed"),
                Err(payload) => error!(
                    task = name,
                    panic = panic_message(payload.as_ref()),
                    "Background task panicked"
                ),
            }
        });
    }

    /// Number of background tasks still running.
    pub fn background_tasks(&self) -> usize {
        self.task_tracker.len()
    }

    /// Create (or promote) the administrator from `ADMIN_EMAIL`/`ADMIN_PASSWORD`.
    ///
    /// The administrator is activated and holds every permission.
    pub async fn seed_admin(&self) -> AppResult<()> {
        let Some(seed) = self.config.admin.clone() else {
            return Ok(());
        };

        let email = seed.email.to_lowercase();
        let existing = self
            .db
            .users
            .find(|u| u.email.to_lowercase() == email)?;

        let admin = match existing {
            Some(mut user) => {
                if !user.activated {
                    user.activated = true;
                    user = self.db.users.update(&user)?;
                }
                user
            }
            None => {
                let password_hash = hash_password(seed.password.clone()).await?;
                self.db.users.insert(User {
                    id: 0,
                    regulation_number: "ADMIN".to_string(),
                    username: seed.username.clone(),
                    fname: seed.username.clone(),
                    lname: "Administrator".to_string(),
                    email: seed.email.clone(),
                    gender: "unspecified".to_string(),
                    formation: 0,
                    rank: 0,
                    postings: 0,
                    password_hash,
                    activated: true,
                    version: 0,
                    created_at: Utc::now(),
                })?
            }
        };

        self.db.permissions.grant(admin.id, Permission::ALL)?;
        info!(user_id = admin.id, email = %admin.email, "Administrator account ready");
        Ok(())
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker
    /// 3. Waits for the remaining tasks, at most `shutdown_timeout`
    ///
    /// Returns `false` if tasks were still running when the timeout expired.
    pub async fn shutdown(&self) -> bool {
        info!(
            pending = self.task_tracker.len(),
            "Initiating graceful shutdown of background tasks"
        );

        self.cancellation_token.cancel();
        self.task_tracker.close();

        match tokio::time::timeout(self.config.shutdown_timeout, self.task_tracker.wait()).await {
            Ok(()) => {
                info!("All background tasks have completed");
                true
            }
            Err(_) => {
                warn!(
                    pending = self.task_tracker.len(),
                    timeout_secs = self.config.shutdown_timeout.as_secs(),
                    "Background tasks still running at shutdown deadline"
                );
                false
            }
        }
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Purge expired tokens every [`TOKEN_PURGE_INTERVAL`] until `cancel` fires.
fn spawn_token_sweeper(db: Arc<Database>, tracker: &TaskTracker, cancel: CancellationToken) {
    tracker.spawn(async move {
        let mut ticker = interval(TOKEN_PURGE_INTERVAL);
        ticker.tick().await; // Skip the first immediate tick

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Token sweeper received cancellation signal");
                    break;
                }
                _ = ticker.tick() => match db.tokens.purge_expired(Utc::now()) {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "Purged expired tokens"),
                    Err(e) => warn!(error = %e, "Token purge failed"),
                },
            }
        }
    });
}
