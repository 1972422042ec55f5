//! Search backends.
//!
//! Every backend implements [`SearchProvider`]; the registry is built once at
//! startup from the typed provider configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;

use super::{SearchOptions, SearchResult};
use crate::config::{Config, RateLimitConfig};
use crate::error::{AppError, Result};

pub mod brave;
pub mod duckduckgo;
pub mod google;

pub use brave::BraveProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use google::GoogleProvider;

const USER_AGENT: &str = concat!("search-assistant/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Runs one query against the backend and normalizes the response.
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>>;

    /// Best-effort query suggestions; never fails.
    async fn get_suggestions(&self, query: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DuckDuckGo,
    Brave,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::DuckDuckGo,
        ProviderKind::Brave,
        ProviderKind::Google,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::DuckDuckGo => "duckduckgo",
            ProviderKind::Brave => "brave",
            ProviderKind::Google => "google",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// An initialized provider and its admission quota, as held by the aggregator.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub provider: Arc<dyn SearchProvider>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl RegisteredProvider {
    pub fn new(provider: Arc<dyn SearchProvider>, rate_limit: Option<RateLimitConfig>) -> Self {
        Self {
            provider,
            rate_limit,
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

/// Instantiates every enabled provider in a fixed order: duckduckgo, brave, google.
pub fn build_registry(config: &Config) -> Result<Vec<RegisteredProvider>> {
    let client = http_client(Duration::from_millis(config.web_search.request_timeout_ms))?;
    let providers = &config.web_search.providers;
    let mut registry = Vec::new();

    for kind in ProviderKind::ALL {
        let settings = match kind {
            ProviderKind::DuckDuckGo => &providers.duckduckgo,
            ProviderKind::Brave => &providers.brave,
            ProviderKind::Google => &providers.google,
        };
        if !settings.enabled {
            continue;
        }
        let provider: Arc<dyn SearchProvider> = match kind {
            ProviderKind::DuckDuckGo => Arc::new(DuckDuckGoProvider::new(
                client.clone(),
                config.proxy_base_url(),
                settings,
            )),
            ProviderKind::Brave => Arc::new(BraveProvider::new(client.clone(), settings)?),
            ProviderKind::Google => Arc::new(GoogleProvider::new(client.clone(), settings)?),
        };
        tracing::info!(provider = kind.name(), "search provider enabled");
        registry.push(RegisteredProvider::new(provider, settings.rate_limit));
    }

    if registry.is_empty() {
        tracing::warn!("no search providers enabled; searches will fail");
    }
    Ok(registry)
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Turns a non-2xx response into a provider error carrying its status.
pub(crate) async fn ensure_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, status = %status, error = %body, "search api error");

    let detail = if body.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    Err(AppError::provider(provider, Some(status.as_u16()), detail))
}

pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> AppError {
    AppError::provider(provider, err.status().map(|s| s.as_u16()), err.to_string())
}

pub(crate) fn language_code(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn kinds_round_trip_names() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ProviderKind::from_name("bing"), None);
    }

    #[test]
    fn registry_follows_enabled_flags() {
        let mut config = Config::default();
        config.web_search.providers.google = ProviderConfig {
            enabled: true,
            api_key: Some("k".into()),
            engine_id: Some("cx".into()),
            ..ProviderConfig::disabled()
        };

        let registry = build_registry(&config).unwrap();
        let names: Vec<_> = registry.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["duckduckgo", "google"]);
        assert_eq!(registry[0].rate_limit.map(|l| l.requests), Some(30));
        assert_eq!(registry[1].rate_limit, None);
    }

    #[test]
    fn language_codes_are_normalized() {
        assert_eq!(language_code("en-US"), "en");
        assert_eq!(language_code("PT_br"), "pt");
        assert_eq!(language_code("de"), "de");
    }
}
