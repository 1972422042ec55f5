use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use search_assistant::{
    config::Config,
    api::create_router,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("search_assistant=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::load()?;
    let server_addr = config.server_addr()?;
    tracing::info!(
        model = %config.llm.model,
        llm = %config.llm.base_url,
        "starting search assistant"
    );

    // Create application state
    let app_state = AppState::from_config(config)?;
    tracing::info!(providers = ?app_state.aggregator.provider_names(), "search providers ready");

    let app = create_router(app_state);
    let listener = TcpListener::bind(server_addr).await?;

    tracing::info!("Listening on {}", server_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
