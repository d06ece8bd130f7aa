mod pages;
mod routes;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bridge::Bridge;

pub use routes::router;

#[derive(Debug, Clone)]
pub struct BindOptions {
    pub host: IpAddr,
    pub port: u16,
    /// Receives the resolved port once listening; used with `--port 0`.
    pub port_file: Option<PathBuf>,
}

pub async fn serve(bind: BindOptions, bridge: Bridge) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
        }
        signal_shutdown.cancel();
    });

    run(bind, bridge, shutdown).await
}

pub async fn run(bind: BindOptions, bridge: Bridge, shutdown: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from((bind.host, bind.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server on {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve local address for bridge listener")?;
    if let Some(path) = bind.port_file {
        tokio::fs::write(&path, format!("{}\n", local_addr.port()))
            .await
            .with_context(|| format!("failed to write listener port to {}", path.display()))?;
    }

    info!(addr = %local_addr, "bridge server listening");

    axum::serve(listener, router(bridge))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
        .context("bridge server exited unexpectedly")
}
