//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Rate Limiting
//!
//! - `LIMITER_ENABLED`: Toggle the per-IP limiter (default: true)
//! - `LIMITER_RPS`: Sustained requests per second per client IP (default: 2)
//! - `LIMITER_BURST`: Bucket capacity per client IP (default: 5)
//!
//! # Security Configuration
//!
//! - `CORS_TRUSTED_ORIGINS`: Space-separated list of origins that receive CORS headers
//! - `ADMIN_EMAIL` / `ADMIN_PASSWORD`: When both are set, an activated administrator
//!   holding every permission is seeded at startup

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 4000)
    pub port: u16,

    /// Deployment environment reported by the healthcheck
    /// (development|staging|production)
    pub environment: String,

    /// Upper bound for draining background tasks on shutdown (default: 30s)
    pub shutdown_timeout: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Whether the per-IP rate limiter is active
    pub limiter_enabled: bool,

    /// Sustained requests per second per client (fractional values allowed)
    pub limiter_rps: f64,

    /// Bucket capacity per client
    pub limiter_burst: u32,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Origins that are echoed back in `Access-Control-Allow-Origin`
    pub cors_trusted_origins: Vec<String>,

    /// Lifetime of an authentication token (default: 24h)
    pub token_ttl: Duration,

    /// Lifetime of an activation token (default: 72h)
    pub activation_ttl: Duration,

    /// Administrator seed account, created at startup when present
    pub admin: Option<AdminSeed>,

    // =========================================================================
    // Mail Configuration
    // =========================================================================
    /// Sender address rendered into outbound mail
    pub smtp_sender: String,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

/// Credentials for the administrator account seeded at startup.
#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

// Keep the seed password out of logs.
impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or
    /// violates a constraint (e.g. zero burst).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 4000)?,
            environment: env::var("ENV").unwrap_or_else(|_| "development".to_string()),
            shutdown_timeout: Duration::from_secs(Self::parse_env("SHUTDOWN_TIMEOUT_SECS", 30)?),

            // Rate limiting
            limiter_enabled: Self::parse_env("LIMITER_ENABLED", true)?,
            limiter_rps: Self::parse_env("LIMITER_RPS", 2.0)?,
            limiter_burst: Self::parse_env("LIMITER_BURST", 5)?,

            // Security
            cors_trusted_origins: Self::parse_trusted_origins(),
            token_ttl: Duration::from_secs(Self::parse_env::<u64>("TOKEN_TTL_HOURS", 24)? * 3600),
            activation_ttl: Duration::from_secs(
                Self::parse_env::<u64>("ACTIVATION_TTL_HOURS", 72)? * 3600,
            ),
            admin: Self::parse_admin_seed(),

            // Mail
            smtp_sender: env::var("SMTP_SENDER")
                .unwrap_or_else(|_| "Training Records <no-reply@training.local>".to_string()),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.limiter_enabled {
            if !(self.limiter_rps.is_finite() && self.limiter_rps > 0.0) {
                return Err(AppError::ConfigError(format!(
                    "LIMITER_RPS ({}) must be a positive number",
                    self.limiter_rps
                )));
            }

            if self.limiter_burst == 0 {
                return Err(AppError::ConfigError(
                    "LIMITER_BURST must be greater than 0".to_string(),
                ));
            }
        }

        if self.token_ttl.is_zero() {
            return Err(AppError::ConfigError(
                "TOKEN_TTL_HOURS must be greater than 0".to_string(),
            ));
        }

        if !matches!(
            self.environment.as_str(),
            "development" | "staging" | "production"
        ) {
            return Err(AppError::ConfigError(format!(
                "ENV must be one of development|staging|production, got {:?}",
                self.environment
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse trusted CORS origins (space separated, like a shell word list).
    fn parse_trusted_origins() -> Vec<String> {
        env::var("CORS_TRUSTED_ORIGINS")
            .map(|raw| split_origins(&raw))
            .unwrap_or_default()
    }

    /// Read the administrator seed; both email and password must be present.
    fn parse_admin_seed() -> Option<AdminSeed> {
        let email = env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty())?;
        let password = env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty())?;
        let username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());

        Some(AdminSeed {
            username,
            email,
            password,
        })
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 4000,
            environment: "development".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            // Rate limiting
            limiter_enabled: true,
            limiter_rps: 2.0,
            limiter_burst: 5,
            // Security
            cors_trusted_origins: vec![],
            token_ttl: Duration::from_secs(24 * 3600),
            activation_ttl: Duration::from_secs(72 * 3600),
            admin: None,
            // Mail
            smtp_sender: "Training Records <no-reply@training.local>".to_string(),
            // Observability
            metrics_port: 0,
        }
    }
}
