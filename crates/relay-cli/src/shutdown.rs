//! SIGTERM / SIGINT handling.

use tokio::sync::watch;
use tracing::{error, info};

/// Spawn a task that flips the returned receiver to `true` on the first
/// SIGTERM or SIGINT.
pub fn install_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = tx.send(true);
    });

    rx
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler, ctrl-c only");
                let _ = ctrl_c.await;
                info!("received SIGINT, shutting down");
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl+C, shutting down");
    }
}

/// Resolve once `rx` reads `true` (or its sender is gone).
pub async fn wait(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
