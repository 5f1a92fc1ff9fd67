use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed the failure is logged and that signal
/// source never fires; the other one still can.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Await `server`, giving up `grace` after `shutdown` has fired.
///
/// Returns `None` when the deadline passed before `server` finished.
pub async fn drain_with_deadline<F>(
    server: F,
    shutdown: CancellationToken,
    grace: Duration,
) -> Option<F::Output>
where
    F: Future,
{
    let deadline = async move {
        shutdown.cancelled().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        output = server => Some(output),
        () = deadline => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_finishes_before_deadline() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let output = drain_with_deadline(async { 7 }, shutdown, Duration::from_secs(5)).await;
        assert_eq!(output, Some(7));
    }

    #[tokio::test]
    async fn test_stuck_drain_is_cut_off() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let output = drain_with_deadline(
            std::future::pending::<()>(),
            shutdown,
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(output, None);
    }

    #[tokio::test]
    async fn test_deadline_waits_for_shutdown_signal() {
        let shutdown = CancellationToken::new();
        let server = tokio::time::sleep(Duration::from_millis(100));

        // No signal yet, so a grace period shorter than the server still lets it finish
        let output = drain_with_deadline(server, shutdown, Duration::from_millis(10)).await;
        assert_eq!(output, Some(()));
    }
}
