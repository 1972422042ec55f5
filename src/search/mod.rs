//! Web search aggregation: providers, rate limiting, caching and merging.

pub mod aggregator;
pub mod cache;
pub mod providers;
pub mod rate_limiter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub use aggregator::SearchAggregator;
pub use cache::{CacheStats, ResultCache};
pub use providers::{ProviderKind, SearchProvider};
pub use rate_limiter::RateLimiter;

/// Recency restriction understood by the providers that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafeSearch {
    Off,
    Moderate,
    Strict,
}

/// Provider-level request options. Unknown fields are ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub safe_search: Option<SafeSearch>,
}

fn default_max_results() -> usize {
    10
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            date_range: None,
            language: None,
            region: None,
            safe_search: None,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(AppError::ValidationError(
                "max_results must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Provider options plus the criteria that can only be applied client-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub safe_search: Option<SafeSearch>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub min_relevance: Option<f32>,
}

impl SearchFilters {
    pub fn to_options(&self) -> SearchOptions {
        SearchOptions {
            max_results: self.max_results.unwrap_or_else(default_max_results),
            date_range: self.date_range,
            language: self.language.clone(),
            region: self.region.clone(),
            safe_search: self.safe_search,
        }
    }

    /// Client-side post-filter for criteria the provider APIs cannot express.
    pub fn accepts(&self, result: &SearchResult) -> bool {
        if let Some(content_type) = self.content_type {
            if ContentType::detect(&result.url) != content_type {
                return false;
            }
        }
        if let Some(min) = self.min_relevance {
            if result.metadata.relevance < min {
                return false;
            }
        }
        true
    }
}

/// Coarse content classification derived from a result URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Pdf,
    Document,
    Video,
    Image,
    Webpage,
}

const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com", "dailymotion.com"];

impl ContentType {
    pub fn detect(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        let path = lower
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|segment| segment.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .unwrap_or_default();

        match extension {
            "pdf" => return ContentType::Pdf,
            "doc" | "docx" | "odt" | "rtf" | "txt" | "ppt" | "pptx" | "xls" | "xlsx" => {
                return ContentType::Document;
            }
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" => return ContentType::Image,
            "mp4" | "webm" | "mov" | "mkv" => return ContentType::Video,
            _ => {}
        }

        if VIDEO_HOSTS.iter().any(|host| path.contains(host)) {
            ContentType::Video
        } else {
            ContentType::Webpage
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub relevance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A normalized search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub content: String,
    pub metadata: ResultMetadata,
    pub provider: String,
    pub cached: bool,
}

impl SearchResult {
    /// Builds a result with a deterministic id and a relevance clamped to [0, 1].
    pub fn new(
        provider: &str,
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        relevance: f32,
    ) -> Self {
        let title = title.into();
        let url = url.into();
        let source = host_of(&url).unwrap_or_else(|| provider.to_string());
        Self {
            id: result_id(provider, &url, &title),
            title,
            url,
            snippet: snippet.into(),
            content: String::new(),
            metadata: ResultMetadata {
                source,
                timestamp: Utc::now(),
                relevance: clamp_relevance(relevance),
                language: None,
            },
            provider: provider.to_string(),
            cached: false,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.metadata.language = language;
        self
    }

    /// Key used to collapse the same hit reported by several providers.
    pub fn dedup_key(&self) -> (String, String) {
        (self.url.clone(), self.title.clone())
    }
}

/// UUIDv5 over `provider`, `url` and `title`, so refetching an item keeps its id.
pub fn result_id(provider: &str, url: &str, title: &str) -> String {
    let name = format!("{}\u{1f}{}\u{1f}{}", provider, url, title);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

pub fn clamp_relevance(relevance: f32) -> f32 {
    if relevance.is_nan() {
        0.0
    } else {
        relevance.clamp(0.0, 1.0)
    }
}

fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, rest)| rest)?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.trim_start_matches("www.").to_string())
    }
}

/// Rejects missing, empty and whitespace-only queries; returns the trimmed text.
pub fn validate_query(query: Option<&str>) -> Result<&str> {
    let trimmed = query.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Err(AppError::ValidationError(
            "search query must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Fallback alternatives for backends without a suggestion API.
pub fn heuristic_suggestions(query: &str) -> Vec<String> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    ["tutorial", "examples", "guide", "documentation"]
        .iter()
        .map(|suffix| format!("{} {}", query, suffix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_queries() {
        assert!(matches!(validate_query(Some("")), Err(AppError::ValidationError(_))));
        assert!(matches!(validate_query(Some("   ")), Err(AppError::ValidationError(_))));
        assert!(matches!(validate_query(None), Err(AppError::ValidationError(_))));
        assert_eq!(validate_query(Some("  rust  ")).unwrap(), "rust");
    }

    #[test]
    fn ids_are_stable_and_provider_scoped() {
        let a = SearchResult::new("brave", "Rust", "https://rust-lang.org", "", 0.8);
        let b = SearchResult::new("brave", "Rust", "https://rust-lang.org", "other", 0.2);
        let c = SearchResult::new("google", "Rust", "https://rust-lang.org", "", 0.8);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn relevance_is_clamped() {
        let high = SearchResult::new("p", "t", "https://a.io", "", 1.7);
        let low = SearchResult::new("p", "t", "https://a.io", "", -0.3);
        assert_eq!(high.metadata.relevance, 1.0);
        assert_eq!(low.metadata.relevance, 0.0);
        assert_eq!(clamp_relevance(f32::NAN), 0.0);
    }

    #[test]
    fn source_is_the_host() {
        let r = SearchResult::new("p", "t", "https://www.example.com:8443/a?b=c", "", 0.5);
        assert_eq!(r.metadata.source, "example.com");
    }

    #[test]
    fn options_ignore_unknown_fields() {
        let options: SearchOptions =
            serde_json::from_str(r#"{"language":"en","colour":"blue"}"#).unwrap();
        assert_eq!(options.max_results, 10);
        assert_eq!(options.language.as_deref(), Some("en"));
    }

    #[test]
    fn content_type_detection() {
        assert_eq!(ContentType::detect("https://a.org/paper.PDF"), ContentType::Pdf);
        assert_eq!(ContentType::detect("https://a.org/x.docx?dl=1"), ContentType::Document);
        assert_eq!(ContentType::detect("https://www.youtube.com/watch?v=1"), ContentType::Video);
        assert_eq!(ContentType::detect("https://a.org/img/logo.png"), ContentType::Image);
        assert_eq!(ContentType::detect("https://a.org/blog/post"), ContentType::Webpage);
    }

    #[test]
    fn filters_apply_min_relevance_and_type() {
        let filters = SearchFilters {
            content_type: Some(ContentType::Pdf),
            min_relevance: Some(0.5),
            ..Default::default()
        };
        let pdf = SearchResult::new("p", "t", "https://a.org/f.pdf", "", 0.9);
        let weak_pdf = SearchResult::new("p", "t", "https://a.org/g.pdf", "", 0.4);
        let page = SearchResult::new("p", "t", "https://a.org/h", "", 0.9);
        assert!(filters.accepts(&pdf));
        assert!(!filters.accepts(&weak_pdf));
        assert!(!filters.accepts(&page));
    }

    #[test]
    fn heuristic_suggestions_append_suffixes() {
        let suggestions = heuristic_suggestions(" tokio ");
        assert_eq!(suggestions[0], "tokio tutorial");
        assert_eq!(suggestions[1], "tokio examples");
        assert!(heuristic_suggestions("  ").is_empty());
    }
}
