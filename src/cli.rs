use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::error::{OrderRejection, Result};
use crate::validation::validate_order_image;

#[derive(Parser)]
#[command(name = "place-orders")]
#[command(version)]
#[command(about = "Command server and painting agents for a shared pixel canvas", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus the PLACE_ENV overlay)
    #[arg(short, long, default_value = "config", env = "PLACE_CONFIG_DIR")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the command server
    Serve {
        /// Listen address, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run a painting agent
    Agent {
        /// Identity reported to the command server, overrides agent.brand
        #[arg(long)]
        brand: Option<String>,
        /// Command server websocket, overrides agent.command_url
        #[arg(long)]
        server: Option<String>,
    },
    /// Check an order image without submitting it
    Validate {
        /// PNG file to check
        image: PathBuf,
    },
}

/// Run the order checks on a local file. The outer error is I/O, the inner
/// one the rejection a submission would get.
pub async fn check_order_file(path: &Path) -> Result<std::result::Result<(), OrderRejection>> {
    let bytes = tokio::fs::read(path).await?;
    let verdict = tokio::task::spawn_blocking(move || validate_order_image(&bytes).map(|_| ()))
        .await
        .map_err(|e| crate::error::PlaceError::Internal(format!("validation task failed: {}", e)))?;
    Ok(verdict)
}
