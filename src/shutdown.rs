use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is
/// received. The dispatcher kills the running engine and leaves the remaining
/// jobs unattempted.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to install signal handlers, shutdown on signal disabled"
                    );
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::warn!("Received SIGTERM, cancelling remaining jobs");
            }
            _ = sigint.recv() => {
                tracing::warn!("Received SIGINT, cancelling remaining jobs");
            }
        }

        token_clone.cancel();
    });

    token
}
