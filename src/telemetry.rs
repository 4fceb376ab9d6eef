//! Tracing subscriber setup for the `taskboard` binary.
//!
//! `RUST_LOG` wins over the configured filter. Output goes to stderr so
//! command output on stdout stays machine-readable.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "taskboard=info,tower_http=info";

/// Build the filter from `RUST_LOG`, falling back to `configured`, then to
/// [`DEFAULT_FILTER`] if `configured` does not parse.
pub fn env_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(filter: &str, json: bool) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(filter));
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.context("Failed to install tracing subscriber")
}
