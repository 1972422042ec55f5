//! DuckDuckGo instant answers.
//!
//! The instant-answer API is key-less but not meant to be called from the
//! browser, so the provider goes through the server's same-origin proxy
//! (`POST /search/duckduckgo`). The proxy side lives here too:
//! [`fetch_instant_answers`] queries the upstream API and flattens it into
//! [`RawResult`]s.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{SearchProvider, ensure_success, transport_error};
use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::search::{SearchOptions, SearchResult, heuristic_suggestions, validate_query};

const NAME: &str = "duckduckgo";

const ANSWER_RELEVANCE: f32 = 1.0;
const OFFICIAL_RELEVANCE: f32 = 0.9;
const TOPIC_RELEVANCE: f32 = 0.7;

/// Body accepted by the proxy endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub query: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub results: Vec<RawResult>,
}

/// Provider-agnostic result as returned by the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub content: Option<String>,
    /// Strength of the match as judged by the proxy.
    #[serde(default)]
    pub relevance: Option<f32>,
}

pub struct DuckDuckGoProvider {
    client: Client,
    proxy_base_url: String,
    relevance: f32,
}

impl DuckDuckGoProvider {
    pub fn new(client: Client, proxy_base_url: String, config: &ProviderConfig) -> Self {
        Self {
            client,
            proxy_base_url: proxy_base_url.trim_end_matches('/').to_string(),
            relevance: config.relevance.unwrap_or(1.0),
        }
    }

    fn normalize(&self, raw: RawResult) -> SearchResult {
        let hint = raw.relevance.unwrap_or(TOPIC_RELEVANCE);
        SearchResult::new(NAME, raw.title, raw.url, raw.snippet, hint * self.relevance)
            .with_content(raw.content.unwrap_or_default())
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = validate_query(Some(query))?;
        let url = format!("{}/search/{}", self.proxy_base_url, NAME);

        tracing::debug!(query = %query, "performing duckduckgo search via proxy");

        let response = self
            .client
            .post(&url)
            .json(&ProxyRequest {
                query: Some(query.to_string()),
            })
            .send()
            .await
            .map_err(|e| transport_error(NAME, e))?;

        let body: ProxyResponse = ensure_success(NAME, response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::provider(NAME, None, format!("malformed proxy response: {}", e)))?;

        let results: Vec<SearchResult> = body
            .results
            .into_iter()
            .take(options.max_results)
            .map(|raw| self.normalize(raw))
            .collect();

        tracing::debug!(query = %query, result_count = results.len(), "duckduckgo search completed");
        Ok(results)
    }

    async fn get_suggestions(&self, query: &str) -> Vec<String> {
        heuristic_suggestions(query)
    }
}

// Upstream instant-answer payload. Only the fields we map are declared.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    abstract_source: String,
    answer: serde_json::Value,
    definition: String,
    #[serde(rename = "DefinitionURL")]
    definition_url: String,
    results: Vec<Topic>,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Topic {
    text: String,
    #[serde(rename = "FirstURL")]
    first_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<Topic>,
    },
    Single(Topic),
}

/// Queries the upstream instant-answer API and flattens the answer,
/// abstract, official results and related topics, strongest first.
pub async fn fetch_instant_answers(
    client: &Client,
    base_url: &str,
    query: &str,
) -> Result<Vec<RawResult>> {
    let response = client
        .get(base_url.trim_end_matches('/'))
        .query(&[
            ("q", query),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ])
        .send()
        .await
        .map_err(|e| transport_error(NAME, e))?;

    let text = ensure_success(NAME, response)
        .await?
        .text()
        .await
        .map_err(|e| transport_error(NAME, e))?;
    let answer: InstantAnswer = serde_json::from_str(&text)
        .map_err(|e| AppError::provider(NAME, None, format!("malformed instant answer: {}", e)))?;

    Ok(flatten(answer, query))
}

fn flatten(answer: InstantAnswer, query: &str) -> Vec<RawResult> {
    let mut out = Vec::new();

    let heading = if answer.heading.is_empty() {
        query.to_string()
    } else {
        answer.heading.clone()
    };

    if let Some(text) = answer.answer.as_str().filter(|s| !s.is_empty()) {
        let url = if answer.abstract_url.is_empty() {
            search_page_url(query)
        } else {
            answer.abstract_url.clone()
        };
        out.push(RawResult {
            title: format!("{} (instant answer)", heading),
            url,
            snippet: text.to_string(),
            content: None,
            relevance: Some(ANSWER_RELEVANCE),
        });
    }

    if !answer.abstract_text.is_empty() && !answer.abstract_url.is_empty() {
        let title = if answer.abstract_source.is_empty() {
            heading.clone()
        } else {
            format!("{} - {}", heading, answer.abstract_source)
        };
        out.push(RawResult {
            title,
            url: answer.abstract_url.clone(),
            snippet: answer.abstract_text.clone(),
            content: Some(answer.abstract_text.clone()),
            relevance: Some(ANSWER_RELEVANCE),
        });
    }

    if !answer.definition.is_empty() && !answer.definition_url.is_empty() {
        out.push(RawResult {
            title: format!("{} (definition)", heading),
            url: answer.definition_url.clone(),
            snippet: answer.definition.clone(),
            content: None,
            relevance: Some(OFFICIAL_RELEVANCE),
        });
    }

    for topic in answer.results {
        if let Some(raw) = topic_to_raw(topic, OFFICIAL_RELEVANCE) {
            out.push(raw);
        }
    }

    for related in answer.related_topics {
        let topics = match related {
            RelatedTopic::Group { topics } => topics,
            RelatedTopic::Single(topic) => vec![topic],
        };
        out.extend(
            topics
                .into_iter()
                .filter_map(|topic| topic_to_raw(topic, TOPIC_RELEVANCE)),
        );
    }

    out
}

fn topic_to_raw(topic: Topic, relevance: f32) -> Option<RawResult> {
    if topic.first_url.is_empty() || topic.text.is_empty() {
        return None;
    }
    let title = match topic.text.split_once(" - ") {
        Some((title, _)) => title.to_string(),
        None => title_from_url(&topic.first_url).unwrap_or_else(|| topic.text.clone()),
    };
    Some(RawResult {
        title,
        url: topic.first_url,
        snippet: topic.text,
        content: None,
        relevance: Some(relevance),
    })
}

// "https://duckduckgo.com/Rust_(programming_language)" -> "Rust (programming language)"
fn title_from_url(url: &str) -> Option<String> {
    let segment = url.trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() || segment.contains('.') {
        return None;
    }
    Some(segment.replace('_', " "))
}

fn search_page_url(query: &str) -> String {
    reqwest::Url::parse_with_params("https://duckduckgo.com/", &[("q", query)])
        .map(String::from)
        .unwrap_or_else(|_| "https://duckduckgo.com/".to_string())
}
