//! `tt serve`: run the daemon until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tt_core::CancelToken;
use tt_daemon::Server;

use crate::Config;
use crate::backend::open_store;

pub async fn run(config: &Config, shutdown: CancelToken) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let addr = config.daemon_addr();
    let listener = TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    Server::new(Arc::clone(&store))
        .run(listener, shutdown)
        .await
        .context("daemon failed")?;
    store.close().await.context("failed to close database")?;
    Ok(())
}
