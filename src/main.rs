use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

mod cmd;

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(version, about = "Real-time task board client and reference backend")]
pub struct Cli {
    /// Path to taskboard.toml. Defaults to ./taskboard.toml, then the user config dir.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// REST base URL. Overrides the config file and TASKBOARD_BACKEND_URL.
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Bearer token. Overrides the config file and TASKBOARD_TOKEN.
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the reference backend
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Accepted bearer token (repeatable). Without any, every non-blank token is accepted.
        #[arg(long = "accept-token")]
        accept_tokens: Vec<String>,
    },
    /// Fetch and print a workspace board
    Show {
        #[arg(short, long)]
        workspace: String,

        /// Print the raw board as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow a workspace board live over the backend's event socket
    Watch {
        #[arg(short, long)]
        workspace: String,

        /// Exit after this many board updates
        #[arg(long)]
        updates: Option<usize>,
    },
    /// Create a list at the end of the board
    AddList {
        #[arg(short, long)]
        workspace: String,

        title: String,
    },
    /// Create a task at the end of a list
    AddTask {
        #[arg(short, long)]
        workspace: String,

        #[arg(short, long)]
        list: String,

        title: String,
    },
    /// Move a task to a slot in a list, as a drag-and-drop would
    MoveTask {
        #[arg(short, long)]
        workspace: String,

        #[arg(short, long)]
        task: String,

        #[arg(long)]
        to_list: String,

        /// Zero-based destination slot; clamped to the list length
        #[arg(long)]
        index: usize,
    },
    /// Delete a task
    DeleteTask {
        #[arg(short, long)]
        workspace: String,

        task: String,
    },
    /// Delete a list and its tasks
    DeleteList {
        #[arg(short, long)]
        workspace: String,

        list: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any problems
    Validate,
    /// Write a default taskboard.toml
    Init {
        /// Where to write the file
        #[arg(long, default_value = "taskboard.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = cmd::load_config(&cli)?;
    cmd::init_logging(&cli, &config);

    match &cli.command {
        Commands::Serve {
            host,
            port,
            accept_tokens,
        } => {
            cmd::cmd_serve(&config, host.clone(), *port, accept_tokens.clone()).await?;
        }
        Commands::Show { workspace, json } => {
            let api = cmd::gateway(&config)?;
            cmd::cmd_show(&api, workspace, *json).await?;
        }
        Commands::Watch { workspace, updates } => {
            let api = Arc::new(cmd::gateway(&config)?);
            cmd::cmd_watch(&config, api, workspace, *updates).await?;
        }
        Commands::AddList { workspace, title } => {
            let api = cmd::gateway(&config)?;
            cmd::cmd_add_list(&api, workspace, title).await?;
        }
        Commands::AddTask {
            workspace,
            list,
            title,
        } => {
            let api = cmd::gateway(&config)?;
            cmd::cmd_add_task(&api, workspace, list, title).await?;
        }
        Commands::MoveTask {
            workspace,
            task,
            to_list,
            index,
        } => {
            let api = cmd::gateway(&config)?;
            cmd::cmd_move_task(&api, workspace, task, to_list, *index).await?;
        }
        Commands::DeleteTask { workspace, task } => {
            let api = cmd::gateway(&config)?;
            cmd::cmd_delete_task(&api, workspace, task).await?;
        }
        Commands::DeleteList { workspace, list } => {
            let api = cmd::gateway(&config)?;
            cmd::cmd_delete_list(&api, workspace, list).await?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(cli.config.as_deref(), &config, command.clone())?;
        }
    }

    Ok(())
}
