//! Live preview server command.

use anyhow::Result;
use pagelet_server::{LiveServer, LiveServerConfig};

use crate::config::ProjectConfig;

/// Run the live preview server.
pub async fn run(config: ProjectConfig, port: Option<u16>, open: bool) -> Result<()> {
    let port = port.unwrap_or(config.server.port);
    tracing::info!("Starting live preview server on port {}", port);

    let server_config = LiveServerConfig {
        pages_dir: config.pages.dir,
        store_dir: config.store.dir,
        port,
        host: config.server.host,
        open,
        limits: config.sandbox,
        options: config.preview,
    };

    LiveServer::new(server_config).start().await?;

    Ok(())
}
