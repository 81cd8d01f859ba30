//! Catalog data models
//!
//! `CatalogRecord` is the canonical shape of one resolved game, regardless of
//! which upstream provider produced it. `CandidateSummary` is the lighter
//! projection returned by a search and is never cached directly.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of search results requested from a provider
pub const DEFAULT_SEARCH_COUNT: u32 = 20;

/// Default language for provider requests
pub const DEFAULT_LANGUAGE: &str = "en";

/// Default country/region for provider requests
pub const DEFAULT_COUNTRY: &str = "us";

/// Upstream provider that produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// General game-metadata provider, keyed by opaque numeric ids
    GameDb,
    /// Storefront-scraping provider, keyed by package identifiers
    Storefront,
}

impl Provider {
    /// Stable snake_case name, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GameDb => "game_db",
            Provider::Storefront => "storefront",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a caller identifies the game it wants
///
/// The two variants live in different key spaces and are resolved by
/// different providers, so they are never conflated into one string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    /// Free-text game name, resolved through search then detail
    ByName(String),
    /// Stable catalog key, such as a storefront package identifier
    ByStableId(String),
}

impl LookupKey {
    /// The raw string the caller supplied
    pub fn as_str(&self) -> &str {
        match self {
            LookupKey::ByName(name) => name,
            LookupKey::ByStableId(id) => id,
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::ByName(name) => write!(f, "name:{}", name),
            LookupKey::ByStableId(id) => write!(f, "id:{}", id),
        }
    }
}

/// Per-request options forwarded to the providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum number of search results
    pub count: u32,
    /// Language code, e.g. "en"
    pub language: String,
    /// Country/region code, e.g. "us"
    pub country: String,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            count: DEFAULT_SEARCH_COUNT,
            language: DEFAULT_LANGUAGE.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }
}

impl SearchOptions {
    /// Default options carrying a record's language and region
    pub fn for_locale(locale: &Locale) -> Self {
        Self {
            language: locale.language.clone(),
            country: locale.country.clone(),
            ..Self::default()
        }
    }

    /// The language and region part of these options
    pub fn locale(&self) -> Locale {
        Locale {
            language: self.language.clone(),
            country: self.country.clone(),
        }
    }
}

/// Language and region a record was resolved with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub language: String,
    pub country: String,
}

/// Summary of a related game shown alongside a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedRecord {
    pub key: String,
    pub title: String,
    pub icon: String,
    pub developer: String,
    pub score_text: String,
    pub price_text: String,
}

/// Lightweight search result produced by a provider's search step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    /// Provider id to pass to the detail step
    pub key: String,
    pub title: String,
    pub summary: String,
    /// Install-count bucket, e.g. "1,000,000+"
    pub installs: String,
    pub score: f64,
    pub score_text: String,
    pub price: f64,
    pub price_text: String,
    pub free: bool,
    pub size: String,
    pub android_version: String,
    pub genre: String,
    pub icon: String,
    pub header_image: Option<String>,
    pub released: Option<String>,
    /// Last update as epoch milliseconds
    pub updated: Option<i64>,
    pub version: Option<String>,
    pub url: String,
}

/// One fully resolved game
///
/// Records are only ever replaced wholesale. `last_refreshed` belongs to the
/// cache store: it is overwritten on every write and ignored on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    // Identity
    pub key: String,
    pub title: String,

    // Descriptive
    pub description: String,
    pub description_html: Option<String>,
    pub summary: String,
    pub genre: String,
    pub genre_id: String,
    pub content_rating: Option<String>,

    // Commercial
    pub installs: String,
    pub min_installs: u64,
    pub score: f64,
    pub score_text: String,
    pub ratings: u64,
    pub reviews: u64,
    /// Star bucket ("1".."5") to rating count
    pub histogram: Option<BTreeMap<String, u64>>,
    pub price: f64,
    pub price_text: String,
    pub currency: String,
    pub free: bool,
    pub offers_iap: bool,
    pub ad_supported: bool,

    // Media and links
    pub icon: String,
    pub header_image: Option<String>,
    pub video: Option<String>,
    pub video_image: Option<String>,
    pub screenshots: Option<Vec<String>>,
    pub url: String,

    // Versioning and provenance
    pub released: Option<String>,
    /// Last upstream update as epoch milliseconds
    pub updated: i64,
    pub version: Option<String>,
    pub recent_changes: Option<String>,
    pub related: Option<Vec<RelatedRecord>>,
    pub provider: Provider,
    /// Options the record was last resolved with; refreshes reuse them
    #[serde(default)]
    pub locale: Option<Locale>,

    /// Set by the cache store on every write
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl CatalogRecord {
    /// Returns true if the record was refreshed less than `stale_after` ago
    pub fn is_fresh(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        match self.last_refreshed {
            Some(refreshed) => now - refreshed < stale_after,
            None => false,
        }
    }

    /// Converts the record's key into the lookup key its provider resolves
    pub fn stable_key(&self) -> LookupKey {
        LookupKey::ByStableId(self.key.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_search_options_defaults() {
        let options = SearchOptions::default();
        assert_eq!(options.count, 20);
        assert_eq!(options.language, "en");
        assert_eq!(options.country, "us");
    }

    #[test]
    fn test_lookup_key_variants_are_distinct() {
        let by_name = LookupKey::ByName("3498".to_string());
        let by_id = LookupKey::ByStableId("3498".to_string());

        assert_ne!(by_name, by_id);
        assert_eq!(by_name.as_str(), by_id.as_str());
        assert_eq!(by_name.to_string(), "name:3498");
        assert_eq!(by_id.to_string(), "id:3498");
    }

    #[test]
    fn test_record_without_refresh_timestamp_is_never_fresh() {
        let record = fixtures::sample_record("com.example.farm", "Farm");
        assert!(!record.is_fresh(Utc::now(), Duration::hours(24)));
    }

    #[test]
    fn test_record_freshness_uses_strict_threshold() {
        let now = Utc::now();
        let mut record = fixtures::sample_record("com.example.farm", "Farm");

        record.last_refreshed = Some(now - Duration::hours(1));
        assert!(record.is_fresh(now, Duration::hours(2)));
        assert!(!record.is_fresh(now, Duration::hours(1)));
    }

    #[test]
    fn test_record_json_uses_snake_case_provider() {
        let record = fixtures::sample_record("com.example.farm", "Farm");
        let json = serde_json::to_string(&record).expect("Failed to serialize record");
        assert!(json.contains("\"provider\":\"storefront\""));
    }

    #[test]
    fn test_record_missing_last_refreshed_deserializes_as_none() {
        let record = fixtures::sample_record("com.example.farm", "Farm");
        let mut value = serde_json::to_value(&record).expect("Failed to serialize record");
        value
            .as_object_mut()
            .expect("record should be an object")
            .remove("last_refreshed");

        let parsed: CatalogRecord = serde_json::from_value(value).expect("Failed to deserialize");
        assert!(parsed.last_refreshed.is_none());
        assert_eq!(parsed.title, "Farm");
    }

    #[test]
    fn test_provider_name_matches_serialized_form() {
        for provider in [Provider::GameDb, Provider::Storefront] {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
    }

    #[test]
    fn test_search_options_for_locale_keeps_default_count() {
        let locale = Locale {
            language: "de".to_string(),
            country: "at".to_string(),
        };
        let options = SearchOptions::for_locale(&locale);
        assert_eq!(options.count, DEFAULT_SEARCH_COUNT);
        assert_eq!(options.locale(), locale);
    }
}
