use tokio_util::sync::CancellationToken;

/// Translate SIGINT/SIGTERM into one cancellation signal for the replay
/// loop, so a pending inter-message sleep is abandoned immediately.
pub fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut terminate =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to register SIGTERM handler");
                        token.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, shutting down..."),
                _ = terminate.recv() => tracing::info!("terminate received, shutting down..."),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received, shutting down...");
        }
        token.cancel();
    });
}
