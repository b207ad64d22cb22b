//! clerk-bot server and maintenance commands.
//!
//! Run with: cargo run -p clerk-bot -- start
//!
//! The browser extension then talks to http://127.0.0.1:8394/api.

mod cli;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use clerk_store::{
    DataDir, DocumentStore, PreferenceStore, Preferences, ProfileStore, paths::DEFAULT_PROFILE,
};
use clerk_transport::{AppState, router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init => init(&cli.config).await,
        Command::Start => start(&cli.config).await,
        Command::Status => status(&cli.config).await,
    }
}

async fn init(config: &Config) -> Result<()> {
    let data = config.data_dir()?;
    data.ensure()
        .await
        .with_context(|| format!("creating {}", data.root().display()))?;

    println!("clerk-bot data directory ready:");
    println!("  {}", data.documents_dir().display());
    println!("  {}", data.profiles_dir().display());
    println!();
    println!("Drop your resume, ID scans and other documents into the documents folder,");
    println!("then run `clerk-bot start`.");
    Ok(())
}

async fn start(config: &Config) -> Result<()> {
    if port_in_use(config).await {
        bail!(
            "port {} is already in use; is clerk-bot already running?",
            config.port
        );
    }

    let data = config.data_dir()?;
    data.ensure().await?;

    let state =
        AppState::new(&data, config.session_config()).with_max_pages(config.max_pages);
    let app = router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(data_dir = %data.root().display(), "Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let data = config.data_dir()?;
    let documents = document_count(&DocumentStore::new(data.documents_dir())).await;
    let profile_cached = ProfileStore::new(data.profile_path(DEFAULT_PROFILE))
        .is_cached()
        .await;
    let preferences = PreferenceStore::new(data.preferences_path()).load().await;
    let server = if port_in_use(config).await {
        format!("running on port {}", config.port)
    } else {
        format!("stopped (port {})", config.port)
    };

    print_status(&data, documents, profile_cached, &preferences, &server);
    Ok(())
}

fn print_status(
    data: &DataDir,
    documents: usize,
    profile_cached: bool,
    preferences: &Preferences,
    server: &str,
) {
    println!("clerk-bot status");
    println!("  Data directory : {}", data.root().display());
    println!("  Documents      : {documents}");
    println!("  Profile cached : {}", if profile_cached { "yes" } else { "no" });
    println!("  Preferences    : {}", preferences.len());
    println!("  Server         : {server}");
    println!();
    println!("{}", preferences.to_context_string());
}

/// Document count for display. A read failure is logged and counts as zero.
async fn document_count(documents: &DocumentStore) -> usize {
    documents.count().await.unwrap_or_else(|e| {
        tracing::warn!(dir = %documents.dir().display(), error = %e, "failed to count documents");
        0
    })
}

async fn port_in_use(config: &Config) -> bool {
    let connect = tokio::net::TcpStream::connect(config.addr());
    matches!(
        tokio::time::timeout(Duration::from_millis(500), connect).await,
        Ok(Ok(_))
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
