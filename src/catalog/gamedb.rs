//! General game-metadata provider client
//!
//! Speaks a RAWG-style REST API: records are keyed by opaque numeric ids and
//! authentication is a static API key passed as the `key` query parameter.
//! The provider has no storefront data, so commercial fields (installs,
//! price, currency) are filled with neutral defaults.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{
    decode_response, endpoint_url, CandidateSummary, CatalogClient, CatalogError, CatalogRecord,
    Provider, SearchOptions,
};

/// Base URL for the game-metadata API
pub const GAMEDB_BASE_URL: &str = "https://api.rawg.io/api";

/// Public web page for a game, by slug
const GAMEDB_WEB_URL: &str = "https://rawg.io/games";

/// Search response envelope
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<GameSummary>,
}

/// One game in a search response
#[derive(Debug, Deserialize)]
struct GameSummary {
    id: u64,
    #[serde(default)]
    slug: String,
    name: String,
    released: Option<String>,
    updated: Option<String>,
    background_image: Option<String>,
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    genres: Vec<Genre>,
}

/// Full game document from the detail endpoint
#[derive(Debug, Deserialize)]
struct GameDetail {
    id: u64,
    #[serde(default)]
    slug: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    description_raw: String,
    released: Option<String>,
    updated: Option<String>,
    background_image: Option<String>,
    background_image_additional: Option<String>,
    #[serde(default)]
    rating: f64,
    #[serde(default)]
    ratings: Vec<RatingBucket>,
    #[serde(default)]
    ratings_count: u64,
    #[serde(default)]
    reviews_count: u64,
    #[serde(default)]
    genres: Vec<Genre>,
    esrb_rating: Option<EsrbRating>,
    clip: Option<Clip>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct EsrbRating {
    name: String,
}

/// Rating bucket: id 5 is the top bucket, 1 the bottom
#[derive(Debug, Deserialize)]
struct RatingBucket {
    id: u8,
    count: u64,
}

#[derive(Debug, Deserialize)]
struct Clip {
    clip: Option<String>,
    preview: Option<String>,
}

/// Client for the general game-metadata provider
#[derive(Debug, Clone)]
pub struct GameDbClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl GameDbClient {
    /// Creates a new GameDbClient against the public API
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(GAMEDB_BASE_URL, api_key)
    }

    /// Creates a new GameDbClient with a custom base URL
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Replaces the HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Detail endpoint for `id`, with the id percent-encoded as one segment
    fn detail_url(&self, id: &str) -> Result<Url, CatalogError> {
        endpoint_url(&self.base_url, &["games", id])
    }

    /// Builds the query string shared by every request
    fn auth_query(&self) -> Vec<(&'static str, String)> {
        if self.api_key.is_empty() {
            Vec::new()
        } else {
            vec![("key", self.api_key.clone())]
        }
    }

    /// Parses a search response body into candidates
    fn parse_search(&self, response: SearchResponse) -> Vec<CandidateSummary> {
        response
            .results
            .into_iter()
            .map(|game| {
                let genre = game
                    .genres
                    .first()
                    .map(|g| g.name.clone())
                    .unwrap_or_default();
                CandidateSummary {
                    key: game.id.to_string(),
                    title: game.name,
                    summary: String::new(),
                    installs: String::new(),
                    score: game.rating,
                    score_text: format!("{:.1}", game.rating),
                    price: 0.0,
                    price_text: String::new(),
                    free: false,
                    size: String::new(),
                    android_version: String::new(),
                    genre,
                    icon: game.background_image.clone().unwrap_or_default(),
                    header_image: game.background_image,
                    released: game.released,
                    updated: game.updated.as_deref().and_then(parse_updated),
                    version: None,
                    url: format!("{}/{}", GAMEDB_WEB_URL, game.slug),
                }
            })
            .collect()
    }

    /// Parses a detail response body into a record
    fn parse_detail(&self, game: GameDetail) -> CatalogRecord {
        let (genre, genre_id) = game
            .genres
            .first()
            .map(|g| (g.name.clone(), g.id.to_string()))
            .unwrap_or_default();

        let histogram: BTreeMap<String, u64> = game
            .ratings
            .iter()
            .map(|bucket| (bucket.id.to_string(), bucket.count))
            .collect();

        let screenshots: Vec<String> = game
            .background_image_additional
            .iter()
            .cloned()
            .collect();

        let (video, video_image) = match game.clip {
            Some(clip) => (clip.clip, clip.preview),
            None => (None, None),
        };

        CatalogRecord {
            key: game.id.to_string(),
            title: game.name,
            summary: first_paragraph(&game.description_raw),
            description: game.description_raw,
            description_html: non_empty(game.description),
            genre,
            genre_id,
            content_rating: game.esrb_rating.map(|r| r.name),
            installs: String::new(),
            min_installs: 0,
            score: game.rating,
            score_text: format!("{:.1}", game.rating),
            ratings: game.ratings_count,
            reviews: game.reviews_count,
            histogram: (!histogram.is_empty()).then_some(histogram),
            price: 0.0,
            price_text: String::new(),
            currency: String::new(),
            free: false,
            offers_iap: false,
            ad_supported: false,
            icon: game.background_image.clone().unwrap_or_default(),
            header_image: game.background_image,
            video,
            video_image,
            screenshots: (!screenshots.is_empty()).then_some(screenshots),
            url: format!("{}/{}", GAMEDB_WEB_URL, game.slug),
            released: game.released,
            updated: game.updated.as_deref().and_then(parse_updated).unwrap_or(0),
            version: None,
            recent_changes: None,
            related: None,
            provider: Provider::GameDb,
            locale: None,
            last_refreshed: None,
        }
    }
}

#[async_trait]
impl CatalogClient for GameDbClient {
    fn provider(&self) -> Provider {
        Provider::GameDb
    }

    /// The provider has no locale or region support, so only `count` applies
    async fn search(
        &self,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<CandidateSummary>, CatalogError> {
        let url = format!("{}/games", self.base_url);
        let mut query = self.auth_query();
        query.push(("search", term.to_string()));
        query.push(("page_size", options.count.to_string()));

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
        _options: &SearchOptions,
    ) -> Result<CatalogRecord, CatalogError> {
        let url = self.detail_url(id)?;
        let response = self
            .http_client
            .get(url)
            .query(&self.auth_query())
            .send()
            .await?;
        let body: GameDetail = decode_response(response, id).await?;
        Ok(self.parse_detail(body))
    }
}

/// Parses the provider's "2023-06-01T12:30:00" timestamps into epoch millis
fn parse_updated(value: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn first_paragraph(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::parse_body;

    const SEARCH_RESPONSE: &str = r#"{
        "count": 2,
        "next": null,
        "results": [
            {
                "id": 10141,
                "slug": "stardew-valley",
                "name": "Stardew Valley",
                "released": "2016-02-26",
                "background_image": "https://media.example/stardew.jpg",
                "rating": 4.41,
                "rating_top": 5,
                "ratings_count": 2100,
                "updated": "2024-01-15T09:30:00",
                "genres": [{"id": 14, "name": "Simulation", "slug": "simulation"}]
            },
            {
                "id": 99,
                "slug": "stardew-clone",
                "name": "Stardew Clone",
                "released": null,
                "background_image": null,
                "rating": 0,
                "updated": null,
                "genres": []
            }
        ]
    }"#;

    const DETAIL_RESPONSE: &str = r#"{
        "id": 10141,
        "slug": "stardew-valley",
        "name": "Stardew Valley",
        "description": "<p>You've inherited your grandfather's old farm plot.</p>",
        "description_raw": "You've inherited your grandfather's old farm plot.\nMore text.",
        "released": "2016-02-26",
        "updated": "2024-01-15T09:30:00",
        "background_image": "https://media.example/stardew.jpg",
        "background_image_additional": "https://media.example/stardew-2.jpg",
        "website": "https://www.stardewvalley.net",
        "rating": 4.41,
        "ratings": [
            {"id": 5, "title": "exceptional", "count": 1200, "percent": 57.1},
            {"id": 4, "title": "recommended", "count": 700, "percent": 33.3},
            {"id": 1, "title": "skip", "count": 20, "percent": 1.0}
        ],
        "ratings_count": 2100,
        "reviews_count": 2150,
        "genres": [{"id": 14, "name": "Simulation", "slug": "simulation"}],
        "esrb_rating": {"id": 1, "name": "Everyone", "slug": "everyone"},
        "clip": null
    }"#;

    fn client() -> GameDbClient {
        GameDbClient::new("test-key")
    }

    #[test]
    fn test_parse_search_preserves_provider_order() {
        let body: SearchResponse = parse_body(SEARCH_RESPONSE, 200).unwrap();
        let candidates = client().parse_search(body);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].key, "10141");
        assert_eq!(candidates[0].title, "Stardew Valley");
        assert_eq!(candidates[0].genre, "Simulation");
        assert_eq!(candidates[0].score_text, "4.4");
        assert_eq!(candidates[0].url, "https://rawg.io/games/stardew-valley");
        assert_eq!(candidates[1].key, "99");
        assert!(candidates[1].header_image.is_none());
    }

    #[test]
    fn test_parse_detail_normalizes_record() {
        let body: GameDetail = parse_body(DETAIL_RESPONSE, 200).unwrap();
        let record = client().parse_detail(body);

        assert_eq!(record.key, "10141");
        assert_eq!(record.title, "Stardew Valley");
        assert_eq!(record.summary, "You've inherited your grandfather's old farm plot.");
        assert!(record
            .description_html
            .as_deref()
            .unwrap()
            .starts_with("<p>"));
        assert_eq!(record.genre_id, "14");
        assert_eq!(record.content_rating.as_deref(), Some("Everyone"));
        assert_eq!(record.ratings, 2100);
        assert_eq!(record.reviews, 2150);
        assert_eq!(record.provider, Provider::GameDb);
        assert!(record.last_refreshed.is_none());

        let histogram = record.histogram.expect("histogram should be present");
        assert_eq!(histogram.get("5"), Some(&1200));
        assert_eq!(histogram.get("1"), Some(&20));
        assert_eq!(record.screenshots.map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_parse_updated_timestamp() {
        let millis = parse_updated("2024-01-15T09:30:00").unwrap();
        assert_eq!(millis, 1_705_311_000_000);
        assert!(parse_updated("yesterday").is_none());
    }

    #[test]
    fn test_auth_query_omits_empty_key() {
        assert!(GameDbClient::new("").auth_query().is_empty());
        assert_eq!(client().auth_query(), vec![("key", "test-key".to_string())]);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = GameDbClient::with_base_url("http://localhost:9000/api/", "k");
        assert_eq!(client.base_url, "http://localhost:9000/api");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = GameDbClient::with_base_url("http://127.0.0.1:1", "k");
        let result = client.search("stardew", &SearchOptions::default()).await;
        assert!(matches!(result, Err(CatalogError::Transport(_))));
    }

    #[test]
    fn test_detail_url_keeps_id_in_one_segment() {
        let url = client().detail_url("3498/screenshots?page=2").unwrap();
        assert_eq!(url.path(), "/api/games/3498%2Fscreenshots%3Fpage=2");
        assert!(url.query().is_none());
    }
}
