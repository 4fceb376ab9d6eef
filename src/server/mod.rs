//! Reference backend: REST persistence plus room broadcast.
//!
//! Stands in for the production store so the client core can be exercised
//! end to end. State is in memory and lost on shutdown.
//!
//! | Route                                  | Method | Broadcast               |
//! |----------------------------------------|--------|-------------------------|
//! | `/api/taskboard/{workspace_id}`        | GET    |                         |
//! | `/api/taskboard/list`                  | POST   | `task:list_created`     |
//! | `/api/taskboard/task`                  | POST   | `task:task_created`     |
//! | `/api/taskboard/tasks/reorder`         | PUT    | `task:tasks_reordered`  |
//! | `/api/taskboard/task/{task_id}`        | DELETE | `task:task_deleted`     |
//! | `/api/taskboard/list/{list_id}`        | DELETE | `task:list_deleted`     |
//! | `/ws`                                  | GET    | join/leave rooms        |
//! | `/health`                              | GET    |                         |

pub mod api;
pub mod state;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::board::channel::RoomHub;
use crate::config::TaskboardConfig;

pub use state::{AppState, SharedState, StoreError};

/// Configuration for the reference backend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub accepted_tokens: Vec<String>,
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_config(&TaskboardConfig::default())
    }
}

impl ServerConfig {
    pub fn from_config(config: &TaskboardConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            accepted_tokens: config.server.accepted_tokens.clone(),
            channel_capacity: config.sync.channel_capacity,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn into_state(self) -> SharedState {
        Arc::new(AppState::new(
            RoomHub::new(self.channel_capacity),
            self.accepted_tokens,
        ))
    }
}

/// Build the full application router with API and WebSocket routes.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: SharedState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

/// Bind to `config.addr()` and serve until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr: SocketAddr = listener.local_addr()?;
    info!(addr = %local_addr, "taskboard backend listening");
    println!("Taskboard backend running at http://{}", local_addr);

    serve(listener, config.into_state(), shutdown_signal()).await?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
