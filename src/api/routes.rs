use axum::{
    routing::{delete, get, post},
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::api::models::{
    AiSearchRequest, FilteredSearchRequest, SearchRequest, SearchResponse, StatsResponse,
    SuggestionsQuery, SuggestionsResponse,
};
use crate::api::response;
use crate::search::ProviderKind;
use crate::search::providers::duckduckgo::{ProxyRequest, ProxyResponse, fetch_instant_answers};
use crate::search::validate_query;
use crate::AppState;

const AI_SEARCH_TIMEOUT: Duration = Duration::from_secs(90);

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/search/:provider", post(proxy_handler))
        .route("/api/search", post(search_handler))
        .route("/api/search/multi", post(multi_search_handler))
        .route("/api/search/filtered", post(filtered_search_handler))
        .route("/api/ai-search", post(ai_search_handler))
        .route("/api/suggestions", get(suggestions_handler))
        .route("/api/cache/stats", get(cache_stats_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .route("/api/rate-limits/reset", post(reset_rate_limits_handler))
        .route("/api/providers", get(providers_handler))
        .route("/api/history", get(history_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/models", get(models_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

/// Same-origin proxy for backends the UI cannot call directly.
async fn proxy_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(req): Json<ProxyRequest>,
) -> Response {
    if ProviderKind::from_name(&provider) != Some(ProviderKind::DuckDuckGo) {
        return response::error::<()>(
            StatusCode::NOT_FOUND,
            format!("no proxy available for provider '{}'", provider),
        )
        .into_response();
    }

    match proxy_search(&state, &req).await {
        Ok(body) => Json(body).into_response(),
        Err(err) => {
            tracing::warn!(provider = %provider, error = %err, "proxy request failed");
            err.into_response()
        }
    }
}

async fn proxy_search(state: &AppState, req: &ProxyRequest) -> Result<ProxyResponse> {
    let query = validate_query(req.query.as_deref())?;
    let results = fetch_instant_answers(
        &state.proxy_client,
        &state.config.web_search.instant_answer_url,
        query,
    )
    .await?;
    tracing::debug!(query = %query, result_count = results.len(), "proxied instant answers");
    Ok(ProxyResponse { results })
}

async fn search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    let result = async {
        let query = validate_query(req.query.as_deref())?;
        let results = state.aggregator.search(query, &req.options).await?;
        Ok::<_, AppError>(SearchResponse::new(query, results))
    }
    .await;
    response::from_result(result)
}

async fn multi_search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    let result = async {
        let query = validate_query(req.query.as_deref())?;
        let results = state
            .aggregator
            .perform_multi_provider_search(query, &req.options)
            .await?;
        Ok::<_, AppError>(SearchResponse::new(query, results))
    }
    .await;
    response::from_result(result)
}

async fn filtered_search_handler(
    State(state): State<AppState>,
    Json(req): Json<FilteredSearchRequest>,
) -> impl IntoResponse {
    let result = async {
        let query = validate_query(req.query.as_deref())?;
        let results = state.aggregator.search_with_filters(query, &req.filters).await?;
        Ok::<_, AppError>(SearchResponse::new(query, results))
    }
    .await;
    response::from_result(result)
}

async fn ai_search_handler(
    State(state): State<AppState>,
    Json(req): Json<AiSearchRequest>,
) -> impl IntoResponse {
    let query = match validate_query(req.query.as_deref()) {
        Ok(query) => query.to_string(),
        Err(err) => return response::from_error(err),
    };
    tracing::info!(query = %query, "processing ai search");
    let start_time = std::time::Instant::now();

    // Set an overall timeout for the entire handler
    let result = tokio::time::timeout(
        AI_SEARCH_TIMEOUT,
        state.orchestrator.perform_ai_search(&query, &req.context),
    )
    .await;

    tracing::info!(elapsed = ?start_time.elapsed(), "ai search finished");

    match result {
        Ok(result) => response::from_result(result),
        Err(_) => response::error(
            StatusCode::REQUEST_TIMEOUT,
            "Request processing timed out".to_string(),
        ),
    }
}

async fn suggestions_handler(
    State(state): State<AppState>,
    Query(params): Query<SuggestionsQuery>,
) -> impl IntoResponse {
    let suggestions = state.aggregator.get_suggestions(&params.q).await;
    response::success(SuggestionsResponse {
        query: params.q.trim().to_string(),
        suggestions,
    })
}

async fn cache_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::success(state.aggregator.cache_stats())
}

async fn clear_cache_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.aggregator.clear_cache();
    response::success(state.aggregator.cache_stats())
}

async fn reset_rate_limits_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.aggregator.reset_rate_limits();
    response::success(state.aggregator.provider_status())
}

async fn providers_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::success(state.aggregator.provider_status())
}

async fn history_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::success(state.orchestrator.history())
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::success(StatsResponse {
        searches: state.orchestrator.stats(),
        cache: state.aggregator.cache_stats(),
        providers: state.aggregator.provider_status(),
    })
}

async fn models_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::from_result(state.llm.list_models().await)
}
