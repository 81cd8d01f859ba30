//! Storefront-scraping provider client
//!
//! Talks to a self-hosted storefront scraper API. Apps are keyed by package
//! identifier (e.g. "com.chucklefish.stardewvalley") and every request
//! carries the caller's language and country.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{
    decode_response, endpoint_url, CandidateSummary, CatalogClient, CatalogError, CatalogRecord,
    Provider, RelatedRecord, SearchOptions,
};

/// Default base URL for a locally hosted scraper API
pub const STOREFRONT_BASE_URL: &str = "http://localhost:3000/api/apps";

/// Search responses come either wrapped or as a bare list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { results: Vec<AppSummary> },
    Bare(Vec<AppSummary>),
}

impl SearchResponse {
    fn into_results(self) -> Vec<AppSummary> {
        match self {
            SearchResponse::Wrapped { results } => results,
            SearchResponse::Bare(results) => results,
        }
    }
}

/// One app in a search response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSummary {
    app_id: String,
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    installs: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    score_text: String,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    price_text: String,
    #[serde(default)]
    free: bool,
    #[serde(default)]
    size: String,
    #[serde(default)]
    android_version: String,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    icon: String,
    header_image: Option<String>,
    released: Option<String>,
    updated: Option<i64>,
    version: Option<String>,
    #[serde(default)]
    url: String,
}

/// Full app document from the detail endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppDetail {
    app_id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "descriptionHTML")]
    description_html: Option<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    installs: String,
    #[serde(default)]
    min_installs: u64,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    score_text: String,
    #[serde(default)]
    ratings: u64,
    #[serde(default)]
    reviews: u64,
    histogram: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    price_text: String,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    free: bool,
    #[serde(rename = "offersIAP", default)]
    offers_iap: bool,
    #[serde(default)]
    ad_supported: bool,
    #[serde(default)]
    genre: String,
    #[serde(default)]
    genre_id: String,
    content_rating: Option<String>,
    #[serde(default)]
    icon: String,
    header_image: Option<String>,
    video: Option<String>,
    video_image: Option<String>,
    screenshots: Option<Vec<String>>,
    #[serde(default)]
    url: String,
    released: Option<String>,
    #[serde(default)]
    updated: i64,
    version: Option<String>,
    recent_changes: Option<String>,
    similar_apps: Option<Vec<SimilarApp>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimilarApp {
    app_id: String,
    title: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    developer: String,
    #[serde(default)]
    score_text: String,
    #[serde(default)]
    price_text: String,
}

/// Client for the storefront scraper API
#[derive(Debug, Clone)]
pub struct StorefrontClient {
    http_client: Client,
    base_url: String,
}

impl Default for StorefrontClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StorefrontClient {
    /// Creates a new StorefrontClient against the default local scraper
    pub fn new() -> Self {
        Self::with_base_url(STOREFRONT_BASE_URL)
    }

    /// Creates a new StorefrontClient with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Replaces the HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Detail endpoint for `id`, with the id percent-encoded as one segment
    fn detail_url(&self, id: &str) -> Result<Url, CatalogError> {
        endpoint_url(&self.base_url, &[id])
    }

    fn locale_query(options: &SearchOptions) -> Vec<(&'static str, String)> {
        vec![
            ("lang", options.language.clone()),
            ("country", options.country.clone()),
        ]
    }

    fn parse_search(&self, response: SearchResponse) -> Vec<CandidateSummary> {
        response
            .into_results()
            .into_iter()
            .map(|app| CandidateSummary {
                key: app.app_id,
                title: app.title,
                summary: app.summary,
                installs: app.installs,
                score: app.score,
                score_text: app.score_text,
                price: app.price,
                price_text: app.price_text,
                free: app.free,
                size: app.size,
                android_version: app.android_version,
                genre: app.genre,
                icon: app.icon,
                header_image: app.header_image,
                released: app.released,
                updated: app.updated,
                version: app.version,
                url: app.url,
            })
            .collect()
    }

    fn parse_detail(&self, app: AppDetail) -> CatalogRecord {
        let related = app.similar_apps.map(|apps| {
            apps.into_iter()
                .map(|similar| RelatedRecord {
                    key: similar.app_id,
                    title: similar.title,
                    icon: similar.icon,
                    developer: similar.developer,
                    score_text: similar.score_text,
                    price_text: similar.price_text,
                })
                .collect()
        });

        CatalogRecord {
            key: app.app_id,
            title: app.title,
            description: app.description,
            description_html: app.description_html,
            summary: app.summary,
            genre: app.genre,
            genre_id: app.genre_id,
            content_rating: app.content_rating,
            installs: app.installs,
            min_installs: app.min_installs,
            score: app.score,
            score_text: app.score_text,
            ratings: app.ratings,
            reviews: app.reviews,
            histogram: app.histogram,
            price: app.price,
            price_text: app.price_text,
            currency: app.currency,
            free: app.free,
            offers_iap: app.offers_iap,
            ad_supported: app.ad_supported,
            icon: app.icon,
            header_image: app.header_image,
            video: app.video,
            video_image: app.video_image,
            screenshots: app.screenshots,
            url: app.url,
            released: app.released,
            updated: app.updated,
            version: app.version,
            recent_changes: app.recent_changes,
            related,
            provider: Provider::Storefront,
            locale: None,
            last_refreshed: None,
        }
    }
}

#[async_trait]
impl CatalogClient for StorefrontClient {
    fn provider(&self) -> Provider {
        Provider::Storefront
    }

    async fn search(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<CandidateSummary>, CatalogError> {
        let url = format!("{}/", self.base_url);
        let mut query = Self::locale_query(options);
        query.push(("q", term.to_string()));
        query.push(("num", options.count.to_string()));

        let response = self.http_client.get(&url).query(&query).send().await?;
        let body: SearchResponse = decode_response(response, term).await?;

        let candidates = self.parse_search(body);
        if candidates.is_empty() {
            return Err(CatalogError::NotFound(format!("no results for '{}'", term)));
        }
        Ok(candidates)
    }

    async fn fetch_detail(
        &self,
        id: &str,
        options: &SearchOptions,
    ) -> Result<CatalogRecord, CatalogError> {
        let url = self.detail_url(id)?;
        let response = self
            .http_client
            .get(url)
            .query(&Self::locale_query(options))
            .send()
            .await?;
        let body: AppDetail = decode_response(response, id).await?;
        Ok(self.parse_detail(body))
    }
}
