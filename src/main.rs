use std::sync::Arc;

use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use terra_backend::{api, config, db, metrics, oracle::GeminiOracle};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("terra_backend=info,tower_http=info")),
        )
        .init();

    let config = config::Config::load();
    config::set_local_mode(config.local_mode);
    if config.local_mode {
        tracing::info!("Local mode enabled: rate limiting is off");
    }
    metrics::register_metrics();

    let db = db::Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");

    let oracle = GeminiOracle::new(
        config.oracle.api_key.clone(),
        config.oracle.model.clone(),
        config.oracle.temperature,
    )
    .with_base_url(config.oracle.base_url.clone());
    if !oracle.has_credential() {
        tracing::warn!("GEMINI_API_KEY is not set; story endpoints will answer 500");
    }

    let state = api::AppState::new(Arc::new(db), Arc::new(oracle));
    let mut app = api::router(state);

    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }

    let app = app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(model = %config.oracle.model, "Terra backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
