use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use super::cache::{CacheStats, ResultCache, cache_key};
use super::providers::{RegisteredProvider, build_registry};
use super::rate_limiter::RateLimiter;
use super::{SearchFilters, SearchOptions, SearchResult, validate_query};
use crate::config::{CacheConfig, Config};
use crate::error::{AppError, Result};

/// Admission state of one provider, as reported by [`SearchAggregator::provider_status`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub name: String,
    /// `None` for providers without a configured limit.
    pub remaining: Option<u32>,
}

/// Picks a provider, enforces its rate limit and caches what comes back.
///
/// The cache and the limiter map are owned here and nowhere else. Both sit
/// behind a mutex that is never held across an `.await`.
pub struct SearchAggregator {
    providers: Vec<RegisteredProvider>,
    limiters: Mutex<HashMap<String, RateLimiter>>,
    cache: Option<Mutex<ResultCache>>,
    request_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SearchAggregator {
    pub fn new(
        providers: Vec<RegisteredProvider>,
        cache: &CacheConfig,
        request_timeout: Duration,
    ) -> Self {
        let limiters = providers
            .iter()
            .filter_map(|p| {
                p.rate_limit
                    .as_ref()
                    .map(|limit| (p.name().to_string(), RateLimiter::from_config(limit)))
            })
            .collect();

        Self {
            providers,
            limiters: Mutex::new(limiters),
            cache: cache
                .enabled
                .then(|| Mutex::new(ResultCache::from_config(cache))),
            request_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            build_registry(config)?,
            &config.web_search.cache,
            Duration::from_millis(config.web_search.request_timeout_ms),
        ))
    }

    /// Single-provider search with caching and rate limiting.
    ///
    /// Provider failures propagate; there is no fallback to another provider.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = validate_query(Some(query))?;
        options.validate()?;
        let key = cache_key(query, options);

        if let Some(cache) = &self.cache {
            if let Some(mut hits) = lock(cache).get(&key) {
                tracing::debug!(query = %query, result_count = hits.len(), "cache hit");
                for hit in &mut hits {
                    hit.cached = true;
                }
                return Ok(hits);
            }
        }

        let provider = self.select_provider()?;
        let results = self.invoke(provider, query, options).await?;

        if let Some(cache) = &self.cache {
            lock(cache).put(key, results.clone());
        }
        Ok(results)
    }

    /// Queries every provider concurrently and merges what succeeds.
    ///
    /// A failing provider contributes nothing. Results are deduplicated on
    /// `(url, title)`, first occurrence in registry order winning, then
    /// sorted by relevance, highest first. Equal relevance keeps insertion
    /// order.
    pub async fn perform_multi_provider_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let query = validate_query(Some(query))?;
        options.validate()?;

        let calls = self
            .providers
            .iter()
            .map(|provider| self.invoke(provider, query, options));
        let outcomes = join_all(calls).await;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for (provider, outcome) in self.providers.iter().zip(outcomes) {
            match outcome {
                Ok(results) => {
                    merged.extend(results.into_iter().filter(|r| seen.insert(r.dedup_key())));
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "provider failed, skipping");
                }
            }
        }

        merged.sort_by(|a, b| b.metadata.relevance.total_cmp(&a.metadata.relevance));
        tracing::info!(query = %query, result_count = merged.len(), "multi-provider search completed");
        Ok(merged)
    }

    /// Provider-side options first, then the criteria only we can check.
    pub async fn search_with_filters(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        let options = filters.to_options();
        let results = self.search(query, &options).await?;
        let before = results.len();
        let filtered: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| filters.accepts(r))
            .collect();
        tracing::debug!(before, after = filtered.len(), "applied client-side filters");
        Ok(filtered)
    }

    pub async fn get_suggestions(&self, query: &str) -> Vec<String> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        match self.providers.first() {
            Some(provider) => provider.provider.get_suggestions(query).await,
            None => Vec::new(),
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            lock(cache).clear();
            tracing::info!("search cache cleared");
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        match &self.cache {
            Some(cache) => lock(cache).stats(),
            None => CacheStats {
                size: 0,
                keys: Vec::new(),
            },
        }
    }

    pub fn reset_rate_limits(&self) {
        for limiter in lock(&self.limiters).values_mut() {
            limiter.reset();
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        let limiters = lock(&self.limiters);
        self.providers
            .iter()
            .map(|p| ProviderStatus {
                name: p.name().to_string(),
                remaining: limiters.get(p.name()).map(RateLimiter::remaining),
            })
            .collect()
    }

    // First provider whose limiter admits the call. When every provider is
    // limited the first one is used anyway so the failure, if any, surfaces.
    fn select_provider(&self) -> Result<&RegisteredProvider> {
        let first = self.providers.first().ok_or_else(|| {
            AppError::provider("aggregator", None, "no search providers enabled")
        })?;

        let mut limiters = lock(&self.limiters);
        for provider in &self.providers {
            let admitted = limiters
                .get_mut(provider.name())
                .is_none_or(RateLimiter::check_limit);
            if admitted {
                return Ok(provider);
            }
        }

        tracing::warn!(
            provider = first.name(),
            "all providers rate limited, falling back to first provider"
        );
        Ok(first)
    }

    async fn invoke(
        &self,
        provider: &RegisteredProvider,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let name = provider.name();
        let started = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(self.request_timeout, provider.provider.search(query, options))
                .await;

        match outcome {
            Ok(Ok(results)) => {
                tracing::debug!(provider = name, result_count = results.len(), elapsed = ?started.elapsed(), "provider responded");
                Ok(results)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::provider(
                name,
                None,
                format!("timed out after {:?}", self.request_timeout),
            )),
        }
    }
}
