use std::future::IntoFuture;
use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use training_records::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    info!(
        "Starting Training Records API v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// `RUST_LOG` filters (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        environment = %config.environment,
        limiter_enabled = config.limiter_enabled,
        trusted_origins = config.cors_trusted_origins.len(),
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    // Build application state and router
    let state = AppState::new(config);
    state.seed_admin().await.map_err(|e| {
        error!(error = %e, "Failed to seed administrator account");
        exitcode::SOFTWARE
    })?;
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!(addr = %addr, env = %state.config.environment, "Starting server");

    // Signal handling cancels `shutdown`; in-flight requests then get
    // `shutdown_timeout` to drain.
    let shutdown = CancellationToken::new();
    let signal = {
        let shutdown = shutdown.clone();
        async move {
            utils::shutdown_signal().await;
            shutdown.cancel();
        }
    };

    // Client addresses feed the rate limiter
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .into_future();

    match utils::drain_with_deadline(server, shutdown, state.config.shutdown_timeout).await {
        Some(result) => result.map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?,
        None => warn!(
            timeout_secs = state.config.shutdown_timeout.as_secs(),
            "In-flight requests still running at shutdown deadline"
        ),
    }

    // Gracefully shutdown background tasks
    info!(addr = %addr, "HTTP server stopped, shutting down background tasks...");
    if !state.shutdown().await {
        warn!("Some background tasks were abandoned");
    }

    info!("Server shutdown complete");
    Ok(())
}
