//! OS signal handling.

/// Wait for Ctrl+C. If the handler cannot be installed the future never resolves,
/// leaving shutdown to the caller's other branches.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
