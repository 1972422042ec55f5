//! AI-assisted search: run a search, then ask the language model to
//! summarize what came back.
//!
//! Analysis is best-effort. Search errors propagate, model errors never do.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AiConfig, LlmConfig};
use crate::error::{AppError, Result};
use crate::llm::{ChatBackend, ChatMessage, ChatOptions};
use crate::scraper::fetch_page_text;
use crate::search::{SearchAggregator, SearchOptions, SearchResult};

pub const NO_RESULTS_ANALYSIS: &str = "No search results found for the given query.";
pub const ANALYSIS_FALLBACK: &str = "Unable to analyze search results at this time.";

const CONTENT_PREVIEW_CHARS: usize = 500;
const FETCHED_CONTENT_CHARS: usize = 4000;

/// Optional context supplied alongside the query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiSearchContext {
    /// Text the user had selected when asking.
    #[serde(default)]
    pub selected_text: Option<String>,
    /// Recent conversation turns.
    #[serde(default)]
    pub conversation: Vec<ChatMessage>,
    #[serde(default)]
    pub options: SearchOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiSearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub analysis: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub query: String,
    pub result_count: usize,
    pub analyzed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub total_searches: u64,
    pub history_len: usize,
    pub last_query: Option<String>,
}

#[derive(Default)]
struct History {
    entries: VecDeque<HistoryEntry>,
    total: u64,
}

pub struct AnalysisOrchestrator {
    aggregator: Arc<SearchAggregator>,
    chat: Arc<dyn ChatBackend>,
    config: AiConfig,
    model: String,
    chat_options: ChatOptions,
    history: Mutex<History>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AnalysisOrchestrator {
    pub fn new(
        aggregator: Arc<SearchAggregator>,
        chat: Arc<dyn ChatBackend>,
        config: AiConfig,
        llm: &LlmConfig,
    ) -> Self {
        Self {
            aggregator,
            chat,
            config,
            model: llm.model.clone(),
            chat_options: ChatOptions {
                temperature: Some(llm.temperature),
                num_predict: llm.max_tokens,
            },
            history: Mutex::new(History::default()),
        }
    }

    pub async fn perform_ai_search(
        &self,
        query: &str,
        context: &AiSearchContext,
    ) -> Result<AiSearchResponse> {
        let query = query.trim();
        let mut results = self.aggregator.search(query, &context.options).await?;

        let analysis = if results.is_empty() {
            tracing::info!(query = %query, "no results, skipping analysis");
            NO_RESULTS_ANALYSIS.to_string()
        } else {
            if self.config.fetch_content {
                self.enrich_content(&mut results).await;
            }
            match self.analyze(query, context, &results).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    let err = AppError::AnalysisError(e.to_string());
                    tracing::warn!(query = %query, error = %err, "falling back to canned analysis");
                    ANALYSIS_FALLBACK.to_string()
                }
            }
        };

        self.record(query, results.len(), analysis_was_produced(&analysis));

        Ok(AiSearchResponse {
            query: query.to_string(),
            results,
            analysis,
            timestamp: Utc::now(),
        })
    }

    async fn analyze(
        &self,
        query: &str,
        context: &AiSearchContext,
        results: &[SearchResult],
    ) -> Result<String> {
        let prompt = build_prompt(&self.config, query, context, results);
        tracing::debug!(prompt_len = prompt.len(), "built analysis prompt");

        let messages = [
            ChatMessage::system(self.config.system_prompt.clone()),
            ChatMessage::user(prompt),
        ];

        let started = std::time::Instant::now();
        let reply = self
            .chat
            .chat(&messages, &self.model, &self.chat_options)
            .await?;
        tracing::info!(elapsed = ?started.elapsed(), "analysis completed");
        Ok(reply.trim().to_string())
    }

    // Pull page text for the results that will be shown to the model.
    async fn enrich_content(&self, results: &mut [SearchResult]) {
        let limit = self.config.max_results_to_analyze;
        for result in results.iter_mut().take(limit) {
            if !result.content.is_empty() {
                continue;
            }
            match fetch_page_text(&result.url, FETCHED_CONTENT_CHARS).await {
                Ok(text) => result.content = text,
                Err(e) => tracing::debug!(url = %result.url, error = %e, "content extraction skipped"),
            }
        }
    }

    fn record(&self, query: &str, result_count: usize, analyzed: bool) {
        let mut history = lock(&self.history);
        history.total += 1;
        history.entries.push_front(HistoryEntry {
            query: query.to_string(),
            result_count,
            analyzed,
            timestamp: Utc::now(),
        });
        history.entries.truncate(self.config.max_history);
    }

    /// Most recent first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        lock(&self.history).entries.iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        lock(&self.history).entries.clear();
    }

    pub fn stats(&self) -> SearchStats {
        let history = lock(&self.history);
        SearchStats {
            total_searches: history.total,
            history_len: history.entries.len(),
            last_query: history.entries.front().map(|e| e.query.clone()),
        }
    }
}

fn analysis_was_produced(analysis: &str) -> bool {
    analysis != NO_RESULTS_ANALYSIS && analysis != ANALYSIS_FALLBACK
}

/// Renders the instruction, query, optional context and the top results.
pub fn build_prompt(
    config: &AiConfig,
    query: &str,
    context: &AiSearchContext,
    results: &[SearchResult],
) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(config.analysis_prompt.trim());
    prompt.push_str("\n\nQuery: ");
    prompt.push_str(query);
    prompt.push('\n');

    if let Some(selected) = context.selected_text.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\nSelected text:\n");
        prompt.push_str(selected.trim());
        prompt.push('\n');
    }

    if !context.conversation.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for message in &context.conversation {
            let role = serde_json::to_value(message.role)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            prompt.push_str(&format!("{}: {}\n", role, message.content.trim()));
        }
    }

    prompt.push_str("\nSearch results:\n");
    for (i, result) in results.iter().take(config.max_results_to_analyze).enumerate() {
        prompt.push_str(&format!(
            "\n[{}] {}\nURL: {}\nSnippet: {}\n",
            i + 1,
            result.title,
            result.url,
            result.snippet
        ));
        if !result.content.is_empty() {
            let preview: String = result.content.chars().take(CONTENT_PREVIEW_CHARS).collect();
            prompt.push_str("Content: ");
            prompt.push_str(&preview);
            if result.content.chars().count() > CONTENT_PREVIEW_CHARS {
                prompt.push_str("...");
            }
            prompt.push('\n');
        }
    }

    prompt
}
