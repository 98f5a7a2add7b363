//! Ponder API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use ponder_api::config::AppConfig;
use ponder_api::error::AppError;
use ponder_api::routes;
use ponder_api::state::AppState;
use ponder_api::telemetry;
use ponder_core::clock::SystemClock;
use ponder_core::rng::SystemRng;
use ponder_generation::openai::OpenAiGenerator;
use ponder_rotation::application::coordinator::RotationCoordinator;
use ponder_store::pg_item_repository::PgItemRepository;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let provider = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!(
        granularity = %config.window_clock.granularity(),
        zone = %config.window_clock.zone(),
        stage_next = config.stage_next,
        "Starting Ponder API server"
    );

    let result = serve(&config).await;
    telemetry::shutdown(provider);
    result.map_err(Into::into)
}

async fn serve(config: &AppConfig) -> Result<(), AppError> {
    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.call_timeout)
        .connect(&config.database_url)
        .await?;
    ponder_store::run_migrations(&pool).await?;

    if config.openai.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; questions will come from the fallback pool");
    }
    let generator = OpenAiGenerator::new(config.openai.clone())
        .map_err(|e| AppError::Config(format!("text generator: {e}")))?;

    let coordinator = Arc::new(RotationCoordinator::new(
        config.coordinator_config(),
        Arc::new(PgItemRepository::new(pool)),
        Arc::new(generator),
        Arc::new(SystemClock),
        Box::new(SystemRng::new()),
    ));
    if let Err(e) = coordinator.initialize().await {
        tracing::warn!(error = %e, "startup initialization failed; will retry on first read");
    }

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/question", routes::question::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(Arc::clone(&coordinator)));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.settle().await;
    tracing::info!("Ponder API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
