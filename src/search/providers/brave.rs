use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{SearchProvider, ensure_success, language_code, transport_error};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::search::{
    DateRange, SafeSearch, SearchOptions, SearchResult, heuristic_suggestions, validate_query,
};

const NAME: &str = "brave";
const DEFAULT_BASE_URL: &str = "https://api.search.brave.com";
const DEFAULT_RELEVANCE: f32 = 0.8;
const MAX_COUNT: usize = 20;

/// Brave Search API provider.
///
/// Documentation: https://api.search.brave.com/app/documentation/web-search
pub struct BraveProvider {
    client: Client,
    api_key: String,
    base_url: String,
    relevance: f32,
}

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    extra_snippets: Vec<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    results: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
struct Suggestion {
    query: String,
}

impl BraveProvider {
    pub fn new(client: Client, config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("Brave API key is required".to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            relevance: config.relevance.unwrap_or(DEFAULT_RELEVANCE),
        })
    }

    fn query_params(query: &str, options: &SearchOptions) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", query.to_string()),
            ("count", options.max_results.min(MAX_COUNT).to_string()),
        ];
        if let Some(safe) = options.safe_search {
            let value = match safe {
                SafeSearch::Off => "off",
                SafeSearch::Moderate => "moderate",
                SafeSearch::Strict => "strict",
            };
            params.push(("safesearch", value.to_string()));
        }
        if let Some(language) = &options.language {
            params.push(("search_lang", language_code(language)));
        }
        if let Some(region) = &options.region {
            params.push(("country", region.to_ascii_lowercase()));
        }
        if let Some(range) = options.date_range {
            let freshness = match range {
                DateRange::Day => "pd",
                DateRange::Week => "pw",
                DateRange::Month => "pm",
                DateRange::Year => "py",
            };
            params.push(("freshness", freshness.to_string()));
        }
        params
    }

    async fn fetch_suggestions(&self, query: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/res/v1/suggest/search", self.base_url))
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", "5")])
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;

        let body: SuggestResponse = ensure_success(NAME, response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::provider(NAME, None, format!("malformed suggestions: {}", e)))?;
        Ok(body.results.into_iter().map(|s| s.query).collect())
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = validate_query(Some(query))?;

        tracing::debug!(
            query = %query,
            max_results = options.max_results,
            "performing brave search"
        );

        let response = self
            .client
            .get(format!("{}/res/v1/web/search", self.base_url))
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&Self::query_params(query, options))
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimitError(
                "brave rejected the request with HTTP 429".to_string(),
            ));
        }

        let body: BraveResponse = ensure_success(NAME, response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::provider(NAME, None, format!("malformed response: {}", e)))?;

        let results: Vec<SearchResult> = body
            .web
            .results
            .into_iter()
            .take(options.max_results)
            .map(|r| {
                SearchResult::new(NAME, r.title, r.url, r.description, self.relevance)
                    .with_content(r.extra_snippets.join("\n"))
                    .with_language(r.language.or_else(|| options.language.clone()))
            })
            .collect();

        tracing::debug!(query = %query, result_count = results.len(), "brave search completed");
        Ok(results)
    }

    async fn get_suggestions(&self, query: &str) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        match self.fetch_suggestions(query).await {
            Ok(suggestions) if !suggestions.is_empty() => suggestions,
            Ok(_) => heuristic_suggestions(query),
            Err(e) => {
                tracing::debug!(error = %e, "brave suggestions unavailable, using heuristics");
                heuristic_suggestions(query)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_api_key() {
        let config = ProviderConfig {
            api_key: Some("  ".into()),
            ..ProviderConfig::disabled()
        };
        assert!(matches!(
            BraveProvider::new(Client::new(), &config),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn maps_options_to_query_params() {
        let options = SearchOptions {
            max_results: 50,
            date_range: Some(DateRange::Week),
            language: Some("en-GB".into()),
            region: Some("GB".into()),
            safe_search: Some(SafeSearch::Strict),
        };
        let params = BraveProvider::query_params("rust", &options);
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("count"), Some("20"));
        assert_eq!(get("freshness"), Some("pw"));
        assert_eq!(get("search_lang"), Some("en"));
        assert_eq!(get("country"), Some("gb"));
        assert_eq!(get("safesearch"), Some("strict"));
    }

    #[test]
    fn defaults_omit_optional_params() {
        let params = BraveProvider::query_params("rust", &SearchOptions::default());
        assert_eq!(params.len(), 2);
    }
}
