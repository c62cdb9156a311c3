use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use localhub_common::Config;
use localhub_store::Store;

mod handlers;
mod session;
mod social;
mod templates;

// --- App State ---

pub struct AppState {
    pub store: Store,
    pub config: Config,
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("localhub=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;

    let state = Arc::new(AppState { store, config: config.clone() });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Pages
        .route("/signin", get(handlers::signin_page))
        .route("/logout", get(handlers::logout))
        .route("/profile", get(handlers::own_profile_page))
        .route("/profile/{username}", get(handlers::profile_page))
        // Activity feed API
        .route("/api/updates", get(handlers::api_user_updates))
        // Social-auth pipeline integration
        .route("/auth/complete", post(social::api_auth_complete))
        .with_state(state)
        // No caching of profile or feed responses
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        // Logging layer: method + path + status + latency only (no query params)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Localhub web server starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
