use axum::{
    response::{IntoResponse, Response},
    Json,
    http::StatusCode,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid query: {0}")]
    ValidationError(String),

    #[error("Search provider '{provider}' failed: {message}")]
    ProviderError {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("Analysis failed: {0}")]
    AnalysisError(String),

    #[error("Failed to fetch data: {0}")]
    FetchError(String),

    #[error("LLM processing error: {0}")]
    LlmError(String),

    #[error("Error parsing content: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Builds a provider error, embedding the HTTP status in the message when known.
    pub fn provider(provider: &str, status: Option<u16>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let message = match status {
            Some(code) => format!("HTTP {}: {}", code, detail),
            None => detail,
        };
        AppError::ProviderError {
            provider: provider.to_string(),
            status,
            message,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderError { .. } => StatusCode::BAD_GATEWAY,
            AppError::RateLimitError(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::FetchError(_) => StatusCode::BAD_REQUEST,
            AppError::ParseError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AnalysisError(_) | AppError::LlmError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::FetchError(err.to_string())
    }
}

impl From<std::env::VarError> for AppError {
    fn from(err: std::env::VarError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
