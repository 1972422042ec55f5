pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod scraper;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use analysis::AnalysisOrchestrator;
use config::Config;
use error::Result;
use llm::OllamaClient;
use search::SearchAggregator;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub aggregator: Arc<SearchAggregator>,
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub llm: Arc<OllamaClient>,
    /// Client used by the same-origin proxy to reach upstream APIs.
    pub proxy_client: reqwest::Client,
}

impl AppState {
    /// Wires providers, cache, rate limiters and the model client from `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let aggregator = Arc::new(SearchAggregator::from_config(&config)?);
        let llm = Arc::new(OllamaClient::new(&config.llm)?);
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            aggregator.clone(),
            llm.clone(),
            config.ai.clone(),
            &config.llm,
        ));
        let proxy_client = search::providers::http_client(Duration::from_millis(
            config.web_search.request_timeout_ms,
        ))?;

        Ok(Self {
            config: Arc::new(config),
            aggregator,
            orchestrator,
            llm,
            proxy_client,
        })
    }
}
