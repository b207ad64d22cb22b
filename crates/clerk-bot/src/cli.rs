//! Command-line interface.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use clerk_session::SessionConfig;
use clerk_store::DataDir;

pub const DEFAULT_PORT: u16 = 8394;

/// Local server that fills web forms from your documents.
#[derive(Parser, Debug)]
#[command(name = "clerk-bot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create the data directory layout
    Init,
    /// Run the HTTP server
    Start,
    /// Show data directory and server status
    Status,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Data directory [default: ~/.clerk-bot]
    #[arg(long, env = "CLERK_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Port to bind
    #[arg(short, long, env = "CLERK_PORT", default_value_t = DEFAULT_PORT, global = true)]
    pub port: u16,

    /// Seconds without progress before the status stream sends a keep-alive
    #[arg(long, env = "CLERK_KEEPALIVE_SECS", default_value_t = 30, global = true)]
    pub keepalive_secs: u64,

    /// Pages a single autofill run may visit
    #[arg(long, env = "CLERK_MAX_PAGES", default_value_t = 25, global = true)]
    pub max_pages: usize,
}

impl Config {
    /// Resolve the data directory.
    ///
    /// # Errors
    /// Returns error if no `--home` was given and the home directory is unknown.
    pub fn data_dir(&self) -> Result<DataDir> {
        let root = match &self.home {
            Some(home) => home.clone(),
            None => DataDir::default_root()
                .context("cannot locate home directory; pass --home or set CLERK_HOME")?,
        };
        Ok(DataDir::new(root))
    }

    #[must_use]
    pub const fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_secs(self.keepalive_secs),
        }
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
