use tokio::signal;

/// Resolves when the process receives a "Ctrl-C" signal. If the signal
/// cannot be registered, the future never resolves.
///
pub async fn ctrl_c() {
    if let Err(error) = signal::ctrl_c().await {
        tracing::error!(%error, "unable to register the 'Ctrl-C' signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("shutting down");
}
