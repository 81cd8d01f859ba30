//! gamecache - resolve game names and package ids into catalog records
//!
//! Wires the cache store, the two catalog providers, the resolver and the
//! maintenance routine together, then runs one CLI command.

use std::sync::Arc;

use clap::Parser;
use reqwest::Client;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gamecache::cache::FileStore;
use gamecache::catalog::{GameDbClient, StorefrontClient};
use gamecache::cli::{parse_lookup, Cli, Command};
use gamecache::config::AppConfig;
use gamecache::maintenance::{Maintenance, MaintenanceHandle, MaintenanceMessage};
use gamecache::resolver::Resolver;

type BoxError = Box<dyn std::error::Error>;

/// Sets up logging to stderr so stdout carries only command output
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Builds the resolver and its dependencies from configuration
fn build_resolver(config: &AppConfig) -> Result<Resolver, BoxError> {
    let store = match &config.cache_dir {
        Some(dir) => FileStore::with_dir(dir.clone()),
        None => FileStore::new().ok_or("Could not determine a cache directory; pass --cache-dir")?,
    };
    info!("Cache directory: {}", store.dir().display());

    let http_client = Client::builder()
        .user_agent(concat!("gamecache/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let gamedb = GameDbClient::with_base_url(&config.gamedb.base_url, &config.gamedb.api_key)
        .with_client(http_client.clone());
    let storefront =
        StorefrontClient::with_base_url(&config.storefront.base_url).with_client(http_client);

    Ok(Resolver::new(
        Arc::new(store),
        Arc::new(gamedb),
        Arc::new(storefront),
        config.resolver.clone(),
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let config = AppConfig::from_cli(&cli)?;
    let options = cli.command.search_options()?;
    let resolver = build_resolver(&config)?;

    match cli.command {
        Command::Resolve { key, id, .. } => {
            let lookup = parse_lookup(&key, id)?;
            let record = resolver.resolve(&lookup, &options).await?;
            print_json(&record)?;
        }
        Command::Get { key, id } => {
            let lookup = parse_lookup(&key, id)?;
            match resolver.cached(&lookup)? {
                Some(record) => print_json(&record)?,
                None => return Err(format!("No cached record for {}", lookup).into()),
            }
        }
        Command::Evict { key, id } => {
            let lookup = parse_lookup(&key, id)?;
            resolver.evict(&lookup)?;
        }
        Command::Sweep { .. } => {
            let maintenance = Maintenance::new(resolver, config.maintenance.mode)
                .with_refresh_concurrency(config.maintenance.refresh_concurrency);
            let report = maintenance.sweep(config.maintenance.stale_after).await;
            print_json(&report)?;
        }
        Command::Watch { .. } => {
            let maintenance = Maintenance::new(resolver, config.maintenance.mode)
                .with_refresh_concurrency(config.maintenance.refresh_concurrency);
            let mut handle = MaintenanceHandle::spawn(maintenance, config.maintenance.clone());
            handle.run_maintenance();
            info!(
                "Running maintenance every {:?}; press Ctrl-C to stop",
                config.maintenance.interval
            );

            loop {
                tokio::select! {
                    message = handle.receiver.recv() => match message {
                        Some(MaintenanceMessage::SweepCompleted(trigger, report)) => {
                            info!(?trigger, evicted = report.evicted, refreshed = report.refreshed, failed = report.failed, "sweep completed");
                        }
                        Some(MaintenanceMessage::SweepStarted(_)) => {}
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            handle.shutdown().await;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
