use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;

use tabula_backend::core::logging;
use tabula_backend::server::router::router;
use tabula_backend::state::{run_startup_probes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize()?;
    logging::init(&state.paths);

    run_startup_probes(&state).await;

    let listener = bind_listener().await?;
    let addr = listener.local_addr()?;

    // The launcher scrapes this line to find the ephemeral port.
    println!("TABULA_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .await
        .context("Server error")
}

/// Binds 127.0.0.1 on `PORT`, or an ephemeral port when unset or invalid.
async fn bind_listener() -> anyhow::Result<TcpListener> {
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))
}
