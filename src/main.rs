//! Sangh web server binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sangh_web::config::Config;
use sangh_web::{bind_with_retry, create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    init_tracing(&config);

    tracing::info!("Starting Sangh web server ({})", config.environment);
    tracing::info!("Build directory: {:?}", config.build_dir);
    tracing::info!("Backend API: {}", config.api_base_url);

    if !config.build_dir.join("index.html").is_file() {
        tracing::warn!(
            "No index.html in {:?}. Client routes will return 404 until the frontend is built!",
            config.build_dir
        );
    }

    let state = AppState::new(config.clone());
    let app = create_router(state);

    // Start server
    let listener = bind_with_retry(
        config.bind_addr(),
        config.listen_retries,
        config.listen_retry_delay,
    )
    .await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
