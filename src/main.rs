//! noskills - community chat server entry point
//!
//! Boots the JSON-backed store, seeds the bootstrap admin account when the
//! user directory is empty, and serves the chat API until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use noskills::config::Config;
use noskills::server::{self, AppState};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    tracing::info!(
        "Starting noskills (data dir: {})",
        config.data_dir.display()
    );

    let state = Arc::new(AppState::new(config));

    state
        .users
        .ensure_default_admin(
            &state.config.admin_username,
            &state.config.admin_password,
        )
        .await
        .context("Failed to seed the bootstrap admin account")?;

    server::run(state).await
}
