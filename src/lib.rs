//! Sangh web server.
//!
//! Serves the single-page application build, resizes uploaded images and
//! provides a client for the community backend REST API.

pub mod api;
pub mod assets;
pub mod client;
pub mod config;
pub mod errors;
pub mod imaging;

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Process start, for the health check uptime.
    pub started: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            started: Instant::now(),
        }
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/images/compress", post(api::compress_image))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        );

    let mut static_routes = Router::new()
        .route("/health", get(api::health_check))
        .route("/share-images/{image_name}", get(api::share_image));

    for asset in assets::NAMED_ASSETS {
        static_routes = static_routes.route(
            asset.route,
            get(move |State(state): State<AppState>| async move {
                api::named_asset(&state, asset).await
            }),
        );
    }

    Router::new()
        .merge(api_routes)
        .merge(static_routes)
        .fallback(api::spa_fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener, retrying while the address is still in use.
pub async fn bind_with_retry(
    addr: SocketAddr,
    retries: u32,
    delay: Duration,
) -> std::io::Result<TcpListener> {
    let mut attempt = 0;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse && attempt < retries => {
                attempt += 1;
                tracing::warn!(
                    "Address {} in use, retrying in {:?} ({}/{})",
                    addr,
                    delay,
                    attempt,
                    retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests;
