use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vellum_search::HashEmbedder;
use vellum_server::{demo, ServerConfig, VellumServer};
use vellum_store::{InMemoryCache, InMemoryStore};

/// Serve the Vellum mutation and search endpoints over in-memory storage.
#[derive(Debug, Parser)]
#[command(name = "vellum-server", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `bind_addr` from the configuration.
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    let embedder = Arc::new(HashEmbedder::default());
    let registry = demo::registry(embedder.clone())?;
    let server = VellumServer::new(
        config,
        Arc::new(registry),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryCache::new()),
        embedder,
    )?;
    server.serve().await?;
    Ok(())
}
