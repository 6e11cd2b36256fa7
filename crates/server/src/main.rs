mod app_state;
mod cache;
mod config;
mod db;
mod errors;
mod handlers;
mod logging;
mod models;
mod rate_limit;
mod schema;
mod upstream;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use app_state::AppState;
use config::{ConfigError, ServerConfig};
use upstream::RedditUpstream;

#[tokio::main]
async fn main() -> Result<(), ConfigError> {
    let config_path = std::env::var("SERVER_CONFIG_PATH")
        .unwrap_or_else(|_| "crates/server/res/config.toml".to_string());

    let config = ServerConfig::load(Path::new(&config_path)).await?;
    logging::init_tracing(&config)?;

    tracing::info!(app = %config.app.name, "starting");
    tracing::info!(host = %config.http.host, port = config.http.port, "server http bind");

    let store = db::connect_db(&config, Path::new(&config_path)).await?;
    schema::apply_server_schema(&config, &store, Path::new(&config_path)).await?;

    let upstream = RedditUpstream::new(&config.upstream)
        .map_err(|e| ConfigError::Invalid(format!("upstream client: {e}")))?;
    tracing::info!(base_url = %config.upstream.base_url, "upstream configured");

    let _pruner = db::spawn_seen_pruner(store.clone(), &config.seen);

    let state = AppState::new(&config, store, Arc::new(upstream));

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("invalid http bind: {e}")))?;

    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| ConfigError::Invalid(format!("http server error: {e}")))?;

    Ok(())
}
