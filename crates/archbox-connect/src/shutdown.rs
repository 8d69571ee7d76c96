//! External shutdown requests.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel the returned token on Ctrl+C, or SIGTERM on Unix.
///
/// Install this only once the tunnel is about to start: until then the
/// default signal behaviour (terminate the process) is what a user pressing
/// Ctrl+C during a download or prompt expects.
pub fn listen() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let trigger = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let sigterm_future = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_future = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C shutdown signal");
            }
            _ = sigterm_future => {
                info!("Received SIGTERM shutdown signal");
            }
        }
        trigger.cancel();
    });

    Ok(token)
}
