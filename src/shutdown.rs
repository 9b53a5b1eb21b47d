use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a handler that cancels the returned token on SIGTERM or SIGINT.
///
/// Every long-running component takes a clone of the token and stops when it
/// is cancelled, letting `main` return normally with exit code 0.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, watching SIGINT only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "No shutdown signal handler installed");
                    return;
                }
                tracing::info!("Received SIGINT, shutting down");
            }
        }
        trigger.cancel();
    });

    token
}
