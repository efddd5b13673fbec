//! Process shutdown signal

use std::future::Future;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Install SIGTERM and SIGINT listeners and return a future resolving on
/// the first of them
///
/// The listeners are registered before this function returns, so a signal
/// raised before the future is first polled is buffered rather than
/// triggering the default action. Must be called from within a Tokio
/// runtime. Falls back to Ctrl-C alone if the Unix handlers cannot be
/// installed.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    let handlers = signal(SignalKind::terminate())
        .and_then(|sigterm| Ok((sigterm, signal(SignalKind::interrupt())?)));

    async move {
        match handlers {
            Ok((mut sigterm, mut sigint)) => {
                let name = tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                };
                info!("Received {}", name);
            }
            Err(e) => {
                warn!(
                    "Failed to install signal handlers ({}), listening for Ctrl-C only",
                    e
                );
                ctrl_c().await;
            }
        }
    }
}

/// Return a future resolving on Ctrl-C
#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    ctrl_c()
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to wait for Ctrl-C: {}", e);
        // Without a signal source the loop only ends on errors
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C");
}
