//! Runtime configuration
//!
//! Plain structs with defaults; the CLI layer overrides individual fields.

use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::gamedb::GAMEDB_BASE_URL;
use crate::catalog::storefront::STOREFRONT_BASE_URL;

/// Upper bound on remote attempts per call, retries included
pub const MAX_ATTEMPTS_CAP: u32 = 2;

/// Stale entries a refresh sweep re-resolves at once
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 4;

/// General game-metadata provider settings
#[derive(Debug, Clone)]
pub struct GameDbConfig {
    pub base_url: String,
    /// Static API key sent as a query parameter
    pub api_key: String,
}

impl Default for GameDbConfig {
    fn default() -> Self {
        Self {
            base_url: GAMEDB_BASE_URL.to_string(),
            api_key: String::new(),
        }
    }
}

/// Storefront scraper provider settings
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub base_url: String,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            base_url: STOREFRONT_BASE_URL.to_string(),
        }
    }
}

/// Read-through behaviour of the resolver
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Age after which a cached record is refreshed on read
    pub stale_after: Duration,
    /// Timeout applied to each remote call independently
    pub request_timeout: Duration,
    /// Attempts per remote call; clamped to `1..=MAX_ATTEMPTS_CAP`
    pub max_attempts: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(24 * 3600),
            request_timeout: Duration::from_secs(10),
            max_attempts: 1,
        }
    }
}

impl ResolverConfig {
    /// Attempts actually made per remote call
    pub fn attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_ATTEMPTS_CAP)
    }
}

/// What a maintenance sweep does with stale entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaintenanceMode {
    /// Delete stale entries
    #[default]
    Evict,
    /// Re-resolve stale entries best-effort, then delete what is still stale
    Refresh,
}

/// Configuration for the periodic maintenance sweep
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Interval between scheduled sweeps
    pub interval: Duration,
    /// Entries older than this are swept
    pub stale_after: Duration,
    pub mode: MaintenanceMode,
    /// Upper bound on concurrent upstream refreshes in refresh mode
    pub refresh_concurrency: usize,
    /// Whether the periodic timer runs; on-demand sweeps work regardless
    pub enabled: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600), // hourly
            stale_after: Duration::from_secs(7 * 24 * 3600),
            mode: MaintenanceMode::Evict,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
            enabled: true,
        }
    }
}

/// Everything needed to wire the application together
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Cache directory; `None` selects the platform cache directory
    pub cache_dir: Option<PathBuf>,
    pub gamedb: GameDbConfig,
    pub storefront: StorefrontConfig,
    pub resolver: ResolverConfig,
    pub maintenance: MaintenanceConfig,
}
