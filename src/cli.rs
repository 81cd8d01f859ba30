//! Command-line interface parsing for gamecache
//!
//! Global flags configure the providers and cache; subcommands map onto the
//! resolver and maintenance operations.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::catalog::model::{DEFAULT_COUNTRY, DEFAULT_LANGUAGE, DEFAULT_SEARCH_COUNT};
use crate::catalog::{LookupKey, SearchOptions};
use crate::config::{AppConfig, MaintenanceMode, MAX_ATTEMPTS_CAP};

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// A lookup key was empty or whitespace
    #[error("Invalid lookup: key must not be empty")]
    EmptyKey,

    /// Staleness threshold must be positive
    #[error("Invalid --stale-hours: '{0}'. Must be greater than zero")]
    InvalidStaleHours(u64),

    /// Retry count outside the supported bound
    #[error("Invalid --retries: '{0}'. At most {max} retry allowed", max = MAX_ATTEMPTS_CAP - 1)]
    TooManyRetries(u32),

    /// Search result count must be positive
    #[error("Invalid --count: '{0}'. Must be greater than zero")]
    InvalidCount(u32),
}

/// gamecache - resolve game names and package ids into cached catalog records
#[derive(Parser, Debug)]
#[command(name = "gamecache")]
#[command(about = "Read-through cache for game catalog lookups")]
#[command(version)]
pub struct Cli {
    /// Cache directory (defaults to the platform cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// API key for the game-metadata provider
    #[arg(long, global = true, env = "GAMEDB_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the game-metadata provider
    #[arg(long, global = true, env = "GAMEDB_API_URL", value_name = "URL")]
    pub gamedb_url: Option<String>,

    /// Base URL of the storefront scraper API
    #[arg(long, global = true, env = "STOREFRONT_API_URL", value_name = "URL")]
    pub storefront_url: Option<String>,

    /// Hours after which a cached record is considered stale
    #[arg(long, global = true, default_value_t = 24)]
    pub stale_hours: u64,

    /// Timeout in seconds for each remote call
    #[arg(long, global = true, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Retries per remote call after a transport or upstream failure
    #[arg(long, global = true, default_value_t = 0)]
    pub retries: u32,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available operations
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve a game by name (or by package id with --id)
    ///
    /// Examples:
    ///   gamecache resolve "Stardew Valley"
    ///   gamecache resolve --id com.chucklefish.stardewvalley
    Resolve {
        /// Game name, or package id when --id is given
        key: String,
        /// Treat KEY as a stable package id
        #[arg(long)]
        id: bool,
        /// Maximum search results to request
        #[arg(long, default_value_t = DEFAULT_SEARCH_COUNT)]
        count: u32,
        /// Language code
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        lang: String,
        /// Country code
        #[arg(long, default_value = DEFAULT_COUNTRY)]
        country: String,
    },
    /// Print a cached record without contacting any provider
    Get {
        /// Game name, or package id when --id is given
        key: String,
        #[arg(long)]
        id: bool,
    },
    /// Remove a cached record
    Evict {
        /// Game name, or package id when --id is given
        key: String,
        #[arg(long)]
        id: bool,
    },
    /// Run one maintenance sweep now
    Sweep {
        /// Re-resolve stale entries before evicting
        #[arg(long)]
        refresh: bool,
    },
    /// Run maintenance periodically until interrupted
    Watch {
        /// Minutes between sweeps
        #[arg(long, default_value_t = 60)]
        interval_mins: u64,
        /// Re-resolve stale entries before evicting
        #[arg(long)]
        refresh: bool,
    },
}

/// Builds a lookup key from a CLI argument
pub fn parse_lookup(key: &str, by_id: bool) -> Result<LookupKey, CliError> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyKey);
    }
    if by_id {
        Ok(LookupKey::ByStableId(trimmed.to_string()))
    } else {
        Ok(LookupKey::ByName(trimmed.to_string()))
    }
}

impl Command {
    /// Search options for `resolve`; defaults for every other command
    pub fn search_options(&self) -> Result<SearchOptions, CliError> {
        match self {
            Command::Resolve {
                count,
                lang,
                country,
                ..
            } => {
                if *count == 0 {
                    return Err(CliError::InvalidCount(*count));
                }
                Ok(SearchOptions {
                    count: *count,
                    language: lang.clone(),
                    country: country.clone(),
                })
            }
            _ => Ok(SearchOptions::default()),
        }
    }
}

impl AppConfig {
    /// Creates an AppConfig from parsed CLI arguments
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.stale_hours == 0 {
            return Err(CliError::InvalidStaleHours(cli.stale_hours));
        }
        if cli.retries >= MAX_ATTEMPTS_CAP {
            return Err(CliError::TooManyRetries(cli.retries));
        }

        let mut config = AppConfig {
            cache_dir: cli.cache_dir.clone(),
            ..Default::default()
        };

        if let Some(key) = &cli.api_key {
            config.gamedb.api_key = key.clone();
        }
        if let Some(url) = &cli.gamedb_url {
            config.gamedb.base_url = url.clone();
        }
        if let Some(url) = &cli.storefront_url {
            config.storefront.base_url = url.clone();
        }

        let stale_after = Duration::from_secs(cli.stale_hours.saturating_mul(3600));
        config.resolver.stale_after = stale_after;
        config.resolver.request_timeout = Duration::from_secs(cli.timeout_secs.max(1));
        config.resolver.max_attempts = cli.retries + 1;
        config.maintenance.stale_after = stale_after;

        match &cli.command {
            Command::Sweep { refresh } => {
                config.maintenance.mode = mode_for(*refresh);
            }
            Command::Watch {
                interval_mins,
                refresh,
            } => {
                config.maintenance.mode = mode_for(*refresh);
                config.maintenance.interval = Duration::from_secs((*interval_mins).max(1) * 60);
            }
            _ => {}
        }

        Ok(config)
    }
}

fn mode_for(refresh: bool) -> MaintenanceMode {
    if refresh {
        MaintenanceMode::Refresh
    } else {
        MaintenanceMode::Evict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lookup_by_name_and_id() {
        assert_eq!(
            parse_lookup(" Stardew Valley ", false).unwrap(),
            LookupKey::ByName("Stardew Valley".to_string())
        );
        assert_eq!(
            parse_lookup("com.example.farm", true).unwrap(),
            LookupKey::ByStableId("com.example.farm".to_string())
        );
    }

    #[test]
    fn test_parse_lookup_rejects_blank() {
        let err = parse_lookup("   ", false).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_cli_parse_resolve_defaults() {
        let cli = Cli::parse_from(["gamecache", "resolve", "Stardew Valley"]);
        assert_eq!(cli.stale_hours, 24);
        assert!(!cli.debug);
        assert_eq!(
            cli.command.search_options().unwrap(),
            SearchOptions::default()
        );
        match cli.command {
            Command::Resolve { key, id, .. } => {
                assert_eq!(key, "Stardew Valley");
                assert!(!id);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_resolve_with_options() {
        let cli = Cli::parse_from([
            "gamecache",
            "resolve",
            "com.example.farm",
            "--id",
            "--count",
            "5",
            "--lang",
            "de",
            "--country",
            "at",
        ]);
        let options = cli.command.search_options().unwrap();
        assert_eq!(options.count, 5);
        assert_eq!(options.language, "de");
        assert_eq!(options.country, "at");
    }

    #[test]
    fn test_zero_count_is_rejected() {
        let cli = Cli::parse_from(["gamecache", "resolve", "x", "--count", "0"]);
        assert!(matches!(
            cli.command.search_options(),
            Err(CliError::InvalidCount(0))
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["gamecache", "sweep", "--stale-hours", "48", "--debug"]);
        assert_eq!(cli.stale_hours, 48);
        assert!(cli.debug);
    }

    #[test]
    fn test_app_config_from_cli() {
        let cli = Cli::parse_from([
            "gamecache",
            "--cache-dir",
            "/tmp/gc",
            "--api-key",
            "secret",
            "--storefront-url",
            "http://scraper.local/api/apps",
            "--stale-hours",
            "2",
            "--retries",
            "1",
            "get",
            "10141",
            "--id",
        ]);
        let config = AppConfig::from_cli(&cli).unwrap();

        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/gc")));
        assert_eq!(config.gamedb.api_key, "secret");
        assert_eq!(config.storefront.base_url, "http://scraper.local/api/apps");
        assert_eq!(config.resolver.stale_after, Duration::from_secs(7200));
        assert_eq!(config.resolver.max_attempts, 2);
    }

    #[test]
    fn test_app_config_watch_sets_maintenance() {
        let cli = Cli::parse_from(["gamecache", "watch", "--interval-mins", "5", "--refresh"]);
        let config = AppConfig::from_cli(&cli).unwrap();

        assert_eq!(config.maintenance.interval, Duration::from_secs(300));
        assert_eq!(config.maintenance.mode, MaintenanceMode::Refresh);
        assert_eq!(config.maintenance.stale_after, Duration::from_secs(86400));
    }

    #[test]
    fn test_app_config_rejects_invalid_values() {
        let cli = Cli::parse_from(["gamecache", "sweep", "--stale-hours", "0"]);
        assert!(matches!(
            AppConfig::from_cli(&cli),
            Err(CliError::InvalidStaleHours(0))
        ));

        let cli = Cli::parse_from(["gamecache", "sweep", "--retries", "3"]);
        assert!(matches!(
            AppConfig::from_cli(&cli),
            Err(CliError::TooManyRetries(3))
        ));
    }
}
