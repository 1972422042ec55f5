//! Typed configuration.
//!
//! Loaded once at startup from, in increasing priority:
//! 1. built-in defaults
//! 2. the TOML file named by `SEARCH_ASSISTANT_CONFIG`
//! 3. environment variables (`.env` is honored)

use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Language-model server connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_ms: u64,
    /// Upper bound on generated tokens (`num_predict`). Unset leaves it to the server.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Upper bound for a single provider call.
    #[serde(default = "default_search_timeout")]
    pub request_timeout_ms: u64,
    /// Base URL of the same-origin search proxy. Defaults to this server.
    #[serde(default)]
    pub proxy_base_url: Option<String>,
    /// Upstream instant-answer API the proxy forwards to.
    #[serde(default = "default_instant_answer_url")]
    pub instant_answer_url: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_duckduckgo")]
    pub duckduckgo: ProviderConfig,
    #[serde(default = "default_brave")]
    pub brave: ProviderConfig,
    #[serde(default = "default_google")]
    pub google: ProviderConfig,
}

/// Per-provider settings. A section that is present is enabled unless it says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Search engine id (Google Custom Search `cx`).
    #[serde(default)]
    pub engine_id: Option<String>,
    /// Overrides the provider's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Relevance assigned to this provider's results, clamped to [0, 1].
    #[serde(default)]
    pub relevance: Option<f32>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_ms: u64,
}

impl RateLimitConfig {
    /// The window as a duration, or `None` when it cannot be scheduled from now.
    pub fn window(&self) -> Option<chrono::Duration> {
        let window = chrono::Duration::try_milliseconds(i64::try_from(self.window_ms).ok()?)?;
        chrono::Utc::now().checked_add_signed(window)?;
        Some(window)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_ms: u64,
    #[serde(default = "default_cache_size")]
    pub max_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_max_results_to_analyze")]
    pub max_results_to_analyze: usize,
    #[serde(default = "default_analysis_prompt")]
    pub analysis_prompt: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Fetch page text for results that came back without content.
    #[serde(default)]
    pub fetch_content: bool,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_llm_timeout() -> u64 {
    120_000
}

fn default_search_timeout() -> u64 {
    10_000
}

fn default_instant_answer_url() -> String {
    "https://api.duckduckgo.com".to_string()
}

fn default_cache_ttl() -> u64 {
    300_000 // 5 minutes
}

fn default_cache_size() -> usize {
    100
}

fn default_max_results_to_analyze() -> usize {
    5
}

fn default_analysis_prompt() -> String {
    "Analyze the following web search results and answer the user's query. \
     Summarize the key findings in Markdown, cite sources by their URL, and \
     point out any disagreement between sources."
        .to_string()
}

fn default_system_prompt() -> String {
    "You are a research assistant that summarizes web search results accurately and concisely."
        .to_string()
}

fn default_max_history() -> usize {
    50
}

fn default_duckduckgo() -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        rate_limit: Some(RateLimitConfig {
            requests: 30,
            window_ms: 60_000,
        }),
        ..ProviderConfig::disabled()
    }
}

fn default_brave() -> ProviderConfig {
    ProviderConfig {
        rate_limit: Some(RateLimitConfig {
            requests: 60,
            window_ms: 60_000,
        }),
        ..ProviderConfig::disabled()
    }
}

fn default_google() -> ProviderConfig {
    ProviderConfig {
        rate_limit: Some(RateLimitConfig {
            requests: 100,
            window_ms: 86_400_000,
        }),
        ..ProviderConfig::disabled()
    }
}

impl ProviderConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            api_key: None,
            engine_id: None,
            base_url: None,
            relevance: None,
            rate_limit: None,
        }
    }

    fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_ms: default_llm_timeout(),
            max_tokens: None,
        }
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_search_timeout(),
            proxy_base_url: None,
            instant_answer_url: default_instant_answer_url(),
            providers: ProvidersConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            duckduckgo: default_duckduckgo(),
            brave: default_brave(),
            google: default_google(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: default_cache_ttl(),
            max_size: default_cache_size(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            max_results_to_analyze: default_max_results_to_analyze(),
            analysis_prompt: default_analysis_prompt(),
            system_prompt: default_system_prompt(),
            max_history: default_max_history(),
            fetch_content: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::load_with(|name| env::var(name).ok())
    }

    /// Builds the config from the file named by `SEARCH_ASSISTANT_CONFIG` plus
    /// variable overrides, all read through `lookup`. Validation runs last.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("SEARCH_ASSISTANT_CONFIG") {
            Some(path) => {
                tracing::info!("Loading config from: {}", path);
                Self::parse_file(Path::new(&path))?
            }
            None => {
                tracing::info!("SEARCH_ASSISTANT_CONFIG not set, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse::<u16>()
                .map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.llm.model = model;
        }

        // A key in the environment switches its provider on.
        let providers = &mut self.web_search.providers;
        if let Some(key) = lookup("BRAVE_API_KEY") {
            providers.brave.api_key = Some(key);
            providers.brave.enabled = true;
        }
        if let Some(key) = lookup("GOOGLE_API_KEY") {
            providers.google.api_key = Some(key);
            providers.google.enabled = true;
        }
        if let Some(cx) = lookup("GOOGLE_CX") {
            providers.google.engine_id = Some(cx);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.server_addr()?;

        let providers = &self.web_search.providers;
        if providers.brave.enabled && !providers.brave.has_api_key() {
            return Err(AppError::ConfigError(
                "brave is enabled but has no api_key".to_string(),
            ));
        }
        if providers.google.enabled {
            if !providers.google.has_api_key() {
                return Err(AppError::ConfigError(
                    "google is enabled but has no api_key".to_string(),
                ));
            }
            if providers.google.engine_id.as_deref().is_none_or(str::is_empty) {
                return Err(AppError::ConfigError(
                    "google is enabled but has no engine_id".to_string(),
                ));
            }
        }

        for (name, provider) in [
            ("duckduckgo", &providers.duckduckgo),
            ("brave", &providers.brave),
            ("google", &providers.google),
        ] {
            if let Some(limit) = provider.rate_limit {
                if limit.requests == 0 || limit.window_ms == 0 {
                    return Err(AppError::ConfigError(format!(
                        "{}: rate_limit requests and window_ms must be positive",
                        name
                    )));
                }
                if limit.window().is_none() {
                    return Err(AppError::ConfigError(format!(
                        "{}: rate_limit window_ms {} is out of range",
                        name, limit.window_ms
                    )));
                }
            }
        }

        let cache = &self.web_search.cache;
        if cache.enabled && (cache.ttl_ms == 0 || cache.max_size == 0) {
            return Err(AppError::ConfigError(
                "cache ttl_ms and max_size must be positive".to_string(),
            ));
        }
        if self.web_search.request_timeout_ms == 0 {
            return Err(AppError::ConfigError(
                "web_search.request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        let ip = IpAddr::from_str(&self.server.host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Where the instant-answer provider sends its proxied requests.
    ///
    /// Without an explicit URL this is the server itself; a bind-all host is
    /// reached over loopback.
    pub fn proxy_base_url(&self) -> String {
        if let Some(url) = &self.web_search.proxy_base_url {
            return url.clone();
        }
        match IpAddr::from_str(&self.server.host) {
            Ok(IpAddr::V4(ip)) if ip.is_unspecified() => {
                format!("http://{}:{}", Ipv4Addr::LOCALHOST, self.server.port)
            }
            Ok(IpAddr::V6(ip)) if ip.is_unspecified() => {
                format!("http://[{}]:{}", Ipv6Addr::LOCALHOST, self.server.port)
            }
            Ok(IpAddr::V6(ip)) => format!("http://[{}]:{}", ip, self.server.port),
            _ => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_only_duckduckgo() {
        let config = Config::default();
        assert!(config.web_search.providers.duckduckgo.enabled);
        assert!(!config.web_search.providers.brave.enabled);
        assert!(!config.web_search.providers.google.enabled);
        assert!(config.validate().is_ok());
        assert_eq!(config.proxy_base_url(), "http://127.0.0.1:3000");
    }

    #[test]
    fn parses_nested_sections() {
        let config = Config::from_toml_str(
            r#"
            [web_search]
            request_timeout_ms = 2500

            [web_search.cache]
            ttl_ms = 1000
            max_size = 3

            [web_search.providers.brave]
            api_key = "secret"
            relevance = 0.6
            rate_limit = { requests = 5, window_ms = 1000 }

            [ai]
            max_results_to_analyze = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.web_search.request_timeout_ms, 2500);
        assert_eq!(config.web_search.cache.max_size, 3);
        assert!(config.web_search.providers.brave.enabled);
        assert_eq!(
            config.web_search.providers.brave.rate_limit,
            Some(RateLimitConfig {
                requests: 5,
                window_ms: 1000
            })
        );
        assert!(config.web_search.providers.duckduckgo.enabled);
        assert_eq!(config.ai.max_results_to_analyze, 2);
        assert_eq!(config.ai.max_history, 50);
    }

    #[test]
    fn rejects_key_provider_without_credentials() {
        let err = Config::from_toml_str(
            r#"
            [web_search.providers.google]
            api_key = "key"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("engine_id")));
    }

    #[test]
    fn rejects_zero_cache_size() {
        let err = Config::from_toml_str(
            r#"
            [web_search.cache]
            max_size = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search-assistant.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            port = 8088

            [llm]
            model = "qwen2.5:7b"

            [web_search.providers.duckduckgo]
            enabled = false
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.llm.model, "qwen2.5:7b");
        assert!(!config.web_search.providers.duckduckgo.enabled);
        assert_eq!(config.proxy_base_url(), "http://127.0.0.1:8088");

        let missing = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, AppError::ConfigError(_)));
    }

    #[test]
    fn rejects_bad_host() {
        let err = Config::from_toml_str(
            r#"
            [server]
            host = "not-an-ip"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("Invalid host")));
    }

    #[test]
    fn env_key_completes_provider_table_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search-assistant.toml");
        std::fs::write(
            &path,
            r#"
            [web_search.providers.brave]
            rate_limit = { requests = 5, window_ms = 1000 }
            "#,
        )
        .unwrap();

        let vars = std::collections::HashMap::from([
            ("SEARCH_ASSISTANT_CONFIG", path.display().to_string()),
            ("BRAVE_API_KEY", "secret".to_string()),
            ("PORT", "8090".to_string()),
        ]);
        let config = Config::load_with(|name| vars.get(name).cloned()).unwrap();

        let brave = &config.web_search.providers.brave;
        assert!(brave.enabled);
        assert_eq!(brave.api_key.as_deref(), Some("secret"));
        assert_eq!(brave.rate_limit.map(|l| l.requests), Some(5));
        assert_eq!(config.server.port, 8090);

        let without_key = std::collections::HashMap::from([(
            "SEARCH_ASSISTANT_CONFIG",
            path.display().to_string(),
        )]);
        let err = Config::load_with(|name| without_key.get(name).cloned()).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("brave")));
    }

    #[test]
    fn rejects_window_too_large_to_schedule() {
        let err = Config::from_toml_str(
            r#"
            [web_search.providers.duckduckgo]
            rate_limit = { requests = 5, window_ms = 18000000000000000 }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(msg) if msg.contains("out of range")));

        // A year-long window is still fine.
        let config = Config::from_toml_str(
            r#"
            [web_search.providers.duckduckgo]
            rate_limit = { requests = 5, window_ms = 31536000000 }
            "#,
        )
        .unwrap();
        assert!(config.web_search.providers.duckduckgo.rate_limit.unwrap().window().is_some());
    }

    #[test]
    fn proxy_url_avoids_bind_all_hosts() {
        let mut config = Config::default();
        config.server.host = "0.0.0.0".to_string();
        assert_eq!(config.proxy_base_url(), "http://127.0.0.1:3000");

        config.server.host = "::".to_string();
        assert_eq!(config.proxy_base_url(), "http://[::1]:3000");

        config.server.host = "::1".to_string();
        assert_eq!(config.proxy_base_url(), "http://[::1]:3000");

        config.web_search.proxy_base_url = Some("http://proxy.local".to_string());
        assert_eq!(config.proxy_base_url(), "http://proxy.local");
    }
}
