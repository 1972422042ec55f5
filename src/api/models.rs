use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::analysis::{AiSearchContext, SearchStats};
use crate::search::aggregator::ProviderStatus;
use crate::search::{CacheStats, SearchFilters, SearchOptions, SearchResult};

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub options: SearchOptions,
}

#[derive(Deserialize)]
pub struct FilteredSearchRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub filters: SearchFilters,
}

#[derive(Deserialize)]
pub struct AiSearchRequest {
    pub query: Option<String>,
    #[serde(flatten)]
    pub context: AiSearchContext,
}

#[derive(Deserialize)]
pub struct SuggestionsQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<SearchResult>,
    pub searched_at: DateTime<Utc>,
}

impl SearchResponse {
    pub fn new(query: &str, results: Vec<SearchResult>) -> Self {
        Self {
            query: query.to_string(),
            count: results.len(),
            results,
            searched_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
pub struct SuggestionsResponse {
    pub query: String,
    pub suggestions: Vec<String>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub searches: SearchStats,
    pub cache: CacheStats,
    pub providers: Vec<ProviderStatus>,
}
