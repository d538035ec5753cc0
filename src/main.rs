//! shelfwatch - supermarket price dashboard server
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup failure (configuration, credentials, table load, bind)

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use shelfwatch::cli::Args;
use shelfwatch::config::{Config, DEFAULT_CONFIG_FILE};
use shelfwatch::credentials::ChainProvider;
use shelfwatch::source::HudiTableSource;
use shelfwatch::{server, Loader, LoaderSettings, ShelfError};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Handle --init-config early (no logging needed)
    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    init_logging(&args);
    info!("shelfwatch v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        match e.downcast_ref::<ShelfError>() {
            Some(shelf) => {
                error!("Startup failed [{}]: {}", shelf.kind(), shelf);
                eprintln!("\nshelfwatch: {} ({})", e, shelf.kind());
            }
            None => {
                error!("Startup failed: {e:#}");
                eprintln!("\nshelfwatch: {e:#}");
            }
        }
        std::process::exit(1);
    }
}

/// Handle --init-config: write a default shelfwatch.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        anyhow::bail!("{DEFAULT_CONFIG_FILE} already exists. Remove it first or edit it manually.");
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {DEFAULT_CONFIG_FILE}"))?;
    println!("Created {DEFAULT_CONFIG_FILE} with default settings.");
    Ok(())
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?.unwrap_or_default(),
    };
    config.merge_with_args(args);
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("Failed to read .env"),
    }

    let config = load_config(&args)?;
    info!("Table: {} ({})", config.table.uri, config.table.region);
    info!("Cache TTL: {}s", config.cache.ttl_seconds);

    let loader = Arc::new(Loader::new(
        LoaderSettings::from_config(&config),
        Arc::new(HudiTableSource),
        Arc::new(ChainProvider::standard(&config.table.region, &config.credentials).await),
    ));

    // Fail fast: nothing is served until the table has loaded once.
    loader.load().await?;

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    server::serve(listener, server::router(loader, config.page.clone())).await?;
    Ok(())
}
