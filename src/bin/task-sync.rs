//! task-sync binary: cycle runner, poller, provider login, and state status.
//!
//! Exit code 0 on a completed cycle even when per-provider errors were
//! recorded; non-zero on configuration errors, a held lock, or state-store
//! failure.

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use task_sync::cli::{Cli, Command};
use task_sync::engine::SyncEngine;
use task_sync::provider::auth;
use task_sync::provider::google::{GoogleConfig, GoogleTasksProvider};
use task_sync::provider::microsoft::{MicrosoftConfig, MicrosoftTodoProvider};
use task_sync::provider::token::TokenStore;
use task_sync::provider::TaskProvider;
use task_sync::state::StateStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &cli.command {
        Some(Command::Login { provider }) => run_login(&cli, provider).await,
        Some(Command::Status) => run_status(&cli).await,
        Some(Command::Poll { .. }) => {
            let engine = build_engine(&cli)?;
            engine.run_poll_loop().await?;
            Ok(())
        }
        Some(Command::Sync) | None => {
            let engine = build_engine(&cli)?;
            let report = engine.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn env_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} is not set"))
}

fn google_config() -> anyhow::Result<GoogleConfig> {
    Ok(GoogleConfig {
        client_id: env_var("TASKSYNC_GOOGLE_CLIENT_ID")?,
        client_secret: env_var("TASKSYNC_GOOGLE_CLIENT_SECRET")?,
        tasklist: std::env::var("TASKSYNC_GOOGLE_TASKLIST")
            .unwrap_or_else(|_| "@default".to_string()),
    })
}

fn microsoft_config() -> anyhow::Result<MicrosoftConfig> {
    Ok(MicrosoftConfig {
        client_id: env_var("TASKSYNC_MS_CLIENT_ID")?,
        client_secret: env_var("TASKSYNC_MS_CLIENT_SECRET")?,
        list_id: env_var("TASKSYNC_MS_LIST_ID")?,
    })
}

fn build_engine(cli: &Cli) -> anyhow::Result<SyncEngine> {
    let mut providers: Vec<Arc<dyn TaskProvider>> = Vec::new();
    for name in &cli.providers {
        match name.as_str() {
            "google" => providers.push(Arc::new(GoogleTasksProvider::new(
                google_config()?,
                &cli.state_dir,
            ))),
            "microsoft" => providers.push(Arc::new(MicrosoftTodoProvider::new(
                microsoft_config()?,
                &cli.state_dir,
            ))),
            other => bail!("unknown provider: {other}"),
        }
    }
    Ok(SyncEngine::new(providers, cli.sync_config())?)
}

async fn run_login(cli: &Cli, provider: &str) -> anyhow::Result<()> {
    let store = TokenStore::new(&cli.state_dir);
    let flow = match provider {
        "google" => GoogleTasksProvider::login_flow(&google_config()?),
        "microsoft" => MicrosoftTodoProvider::login_flow(&microsoft_config()?),
        other => bail!("unknown provider: {other}"),
    };
    auth::run_login(&flow, &store).await?;
    println!("Tokens stored for {provider}.");
    Ok(())
}

async fn run_status(cli: &Cli) -> anyhow::Result<()> {
    let store = StateStore::new(&cli.state_dir);
    let state = store.load().await?;

    println!("state file:  {}", store.state_path().display());
    println!(
        "last sync:   {}",
        state
            .last_sync_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    println!("mappings:    {}", state.mappings.len());
    println!("tombstones:  {}", state.tombstones.len());
    Ok(())
}
