//! Reference backend command — `taskboard serve`.

use anyhow::Result;
use taskboard::config::TaskboardConfig;
use taskboard::server::{self, ServerConfig};

pub async fn cmd_serve(
    config: &TaskboardConfig,
    host: Option<String>,
    port: Option<u16>,
    accept_tokens: Vec<String>,
) -> Result<()> {
    let mut server_config = ServerConfig::from_config(config);
    if let Some(host) = host {
        server_config.host = host;
    }
    if let Some(port) = port {
        server_config.port = port;
    }
    if !accept_tokens.is_empty() {
        server_config.accepted_tokens = accept_tokens;
    }

    server::start_server(server_config).await
}
