//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                                              |
//! |----------|---------------------------------------------------------------|
//! | `board`  | `Show`, `Watch`, `AddList`, `AddTask`, `MoveTask`, `DeleteTask`, `DeleteList` |
//! | `config` | `Config`                                                      |
//! | `serve`  | `Serve`                                                       |

pub mod board;
pub mod config;
pub mod serve;

use anyhow::{Context, Result};
use taskboard::board::gateway::HttpGateway;
use taskboard::config::TaskboardConfig;

use super::Cli;

pub use board::{
    cmd_add_list, cmd_add_task, cmd_delete_list, cmd_delete_task, cmd_move_task, cmd_show,
    cmd_watch,
};
pub use config::cmd_config;
pub use serve::cmd_serve;

/// File, then environment, then CLI flags.
pub fn load_config(cli: &Cli) -> Result<TaskboardConfig> {
    let mut config = TaskboardConfig::load_or_default(cli.config.as_deref())?.with_env_overrides();
    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    if let Some(token) = &cli.token {
        config.auth.token = Some(token.clone());
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    Ok(config)
}

pub fn init_logging(cli: &Cli, config: &TaskboardConfig) {
    let filter = if cli.verbose {
        "taskboard=debug,tower_http=debug"
    } else {
        config.logging.filter.as_str()
    };
    if let Err(e) = taskboard::telemetry::init_tracing(filter, config.logging.json) {
        eprintln!("{} {:#}", console::style("Warning:").yellow(), e);
    }
}

pub fn gateway(config: &TaskboardConfig) -> Result<HttpGateway> {
    HttpGateway::from_config(config).context("Failed to set up the backend client")
}
