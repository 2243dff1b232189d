//! Health-check HTTP endpoint

use axum::routing::get;
use axum::Router;

async fn ping() -> &'static str {
    "pong"
}

/// Serve `GET /ping → "pong"` on the configured port.
///
/// Runs until the process exits; spawned alongside the engine loop.
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let app = Router::new().route("/ping", get(ping));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "health endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
