use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first SIGTERM or SIGINT.
///
/// The coordinator stops polling for quorum and abandons any unpublished
/// metadata once the token is cancelled.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, stopping coordinator");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, stopping coordinator");
            }
            _ = token.cancelled() => return,
        }

        token.cancel();
    });
}
