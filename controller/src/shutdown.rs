use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::Result;

/// A token cancelled on the first SIGTERM or SIGINT. Every long-running
/// component watches it and winds down on its own.
pub fn install_shutdown_handler() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down..."),
        }
        cancel.cancel();
    });
    Ok(token)
}
