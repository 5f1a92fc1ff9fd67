//! Per-client rate limiting using the token bucket algorithm.
//!
//! # Algorithm
//!
//! Each client IP owns a Governor direct limiter (GCRA, equivalent to a token
//! bucket) refilled at `rps` tokens per second with capacity `burst`. Buckets
//! are created the first time an IP is seen.
//!
//! ```text
//!            ┌──────────── one Mutex ────────────┐
//! request ─▶ │ lookup/create ─▶ last_seen = now ─▶ check │ ─▶ allow / 429
//!            └───────────────────────────────────┘
//!                          ▲
//!  sweeper (every 60s) ────┘ evict clients idle > 180s
//! ```
//!
//! The client IP is taken from the peer socket address only. Forwarding
//! headers are not consulted.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::metrics;

/// How often idle clients are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Clients not seen for longer than this are forgotten.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(180);

/// Decides whether a client may proceed.
pub trait RateLimit: Send + Sync {
    fn allow(&self, client_ip: IpAddr) -> bool;
}

struct ClientState {
    limiter: DefaultDirectRateLimiter,
    last_seen: Instant,
}

/// Token bucket per client IP.
pub struct ClientRateLimiter {
    quota: Quota,
    clients: Mutex<HashMap<IpAddr, ClientState>>,
}

impl ClientRateLimiter {
    /// Build a limiter refilling `rps` tokens per second up to `burst`.
    ///
    /// Returns `None` for a non-positive rate or a zero burst.
    pub fn new(rps: f64, burst: u32) -> Option<Self> {
        if !(rps.is_finite() && rps > 0.0) {
            return None;
        }
        let period = Duration::try_from_secs_f64(1.0 / rps).ok()?;
        let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::new(burst)?);

        Some(Self {
            quota,
            clients: Mutex::new(HashMap::new()),
        })
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<IpAddr, ClientState>> {
        // The map holds no invariant a panicking holder could break.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// [`RateLimit::allow`] with an explicit "now" for `last_seen`.
    pub fn allow_at(&self, client_ip: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients();
        let client = clients.entry(client_ip).or_insert_with(|| {
            debug!(client_ip = %client_ip, "Tracking new client");
            ClientState {
                limiter: RateLimiter::direct(self.quota),
                last_seen: now,
            }
        });
        client.last_seen = now;
        client.limiter.check().is_ok()
    }

    /// Forget every client idle for longer than [`IDLE_TIMEOUT`] at `now`.
    ///
    /// Returns the number of clients removed.
    pub fn evict_idle_at(&self, now: Instant) -> usize {
        let mut clients = self.clients();
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= IDLE_TIMEOUT);
        metrics::set_tracked_clients(clients.len());
        before - clients.len()
    }

    pub fn is_tracked(&self, client_ip: IpAddr) -> bool {
        self.clients().contains_key(&client_ip)
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients().len()
    }

    /// Run the idle sweep every [`SWEEP_INTERVAL`] until `cancel` fires.
    pub fn spawn_sweeper(self: Arc<Self>, tracker: &TaskTracker, cancel: CancellationToken) {
        tracker.spawn(async move {
            let mut ticker = interval(SWEEP_INTERVAL);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limiter sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.evict_idle_at(Instant::now());
                        if evicted > 0 {
                            debug!(evicted, "Evicted idle rate limiter clients");
                        }
                    }
                }
            }
        });
    }
}

impl RateLimit for ClientRateLimiter {
    fn allow(&self, client_ip: IpAddr) -> bool {
        self.allow_at(client_ip, Instant::now())
    }
}

/// Rate limiting layer for the Tower middleware stack.
///
/// With no limiter every request proceeds.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Option<Arc<dyn RateLimit>>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<dyn RateLimit>) -> Self {
        Self {
            limiter: Some(limiter),
        }
    }

    /// Create a disabled rate limiter (allows all requests).
    pub fn disabled() -> Self {
        Self { limiter: None }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Option<Arc<dyn RateLimit>>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(limiter) = limiter else {
                return inner.call(req).await;
            };

            let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied()
            else {
                return Ok(AppError::Internal(
                    "client address unavailable for rate limiting".to_string(),
                )
                .into_response());
            };

            let client_ip = peer.ip();
            if limiter.allow(client_ip) {
                inner.call(req).await
            } else {
                warn!(
                    client_ip = %client_ip,
                    path = %req.uri().path(),
                    "Rate limit exceeded for IP"
                );
                metrics::record_rate_limited();
                Ok(AppError::RateLimitExceeded.into_response())
            }
        })
    }
}
