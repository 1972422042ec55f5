#![allow(dead_code)]

use search_assistant::{AppState, api::create_router, config::Config};
use tokio::net::TcpListener;

/// Starts the router on an ephemeral port and returns its base URL.
///
/// The instant-answer provider is pointed back at this server so searches
/// go through the real proxy route.
pub async fn spawn_app(mut config: Config) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    config.web_search.proxy_base_url = Some(base_url.clone());

    let state = AppState::from_config(config).expect("valid test config");
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base_url
}

/// Default config with the upstream instant-answer API replaced by `upstream`.
pub fn config_with_upstream(upstream: &str) -> Config {
    let mut config = Config::default();
    config.web_search.instant_answer_url = upstream.to_string();
    config
}
