use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{SearchProvider, ensure_success, language_code, transport_error};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::search::{
    DateRange, SafeSearch, SearchOptions, SearchResult, heuristic_suggestions, validate_query,
};

const NAME: &str = "google";
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const DEFAULT_RELEVANCE: f32 = 0.85;
// The Custom Search API refuses num > 10.
const MAX_NUM: usize = 10;

/// Google Programmable Search (Custom Search JSON API).
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    engine_id: String,
    base_url: String,
    relevance: f32,
}

#[derive(Debug, Default, Deserialize)]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

impl GoogleProvider {
    pub fn new(client: Client, config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("Google API key is required".to_string()))?;
        let engine_id = config
            .engine_id
            .clone()
            .filter(|cx| !cx.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("Google engine_id (cx) is required".to_string()))?;

        Ok(Self {
            client,
            api_key,
            engine_id,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            relevance: config.relevance.unwrap_or(DEFAULT_RELEVANCE),
        })
    }

    fn query_params(&self, query: &str, options: &SearchOptions) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("key", self.api_key.clone()),
            ("cx", self.engine_id.clone()),
            ("q", query.to_string()),
            ("num", options.max_results.clamp(1, MAX_NUM).to_string()),
        ];
        if let Some(safe) = options.safe_search {
            let value = match safe {
                SafeSearch::Off => "off",
                SafeSearch::Moderate | SafeSearch::Strict => "active",
            };
            params.push(("safe", value.to_string()));
        }
        if let Some(language) = &options.language {
            params.push(("lr", format!("lang_{}", language_code(language))));
        }
        if let Some(region) = &options.region {
            params.push(("gl", region.to_ascii_lowercase()));
        }
        if let Some(range) = options.date_range {
            let restrict = match range {
                DateRange::Day => "d1",
                DateRange::Week => "w1",
                DateRange::Month => "m1",
                DateRange::Year => "y1",
            };
            params.push(("dateRestrict", restrict.to_string()));
        }
        params
    }
}

#[async_trait]
impl SearchProvider for GoogleProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = validate_query(Some(query))?;

        tracing::debug!(query = %query, max_results = options.max_results, "performing google search");

        let response = self
            .client
            .get(format!("{}/customsearch/v1", self.base_url))
            .query(&self.query_params(query, options))
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimitError(
                "google daily quota exhausted (HTTP 429)".to_string(),
            ));
        }

        let body: CustomSearchResponse = ensure_success(NAME, response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::provider(NAME, None, format!("malformed response: {}", e)))?;

        let results: Vec<SearchResult> = body
            .items
            .into_iter()
            .take(options.max_results)
            .map(|item| {
                SearchResult::new(NAME, item.title, item.link, item.snippet, self.relevance)
                    .with_language(options.language.clone())
            })
            .collect();

        tracing::debug!(query = %query, result_count = results.len(), "google search completed");
        Ok(results)
    }

    // No public suggestion endpoint for Custom Search.
    async fn get_suggestions(&self, query: &str) -> Vec<String> {
        heuristic_suggestions(query)
    }
}
