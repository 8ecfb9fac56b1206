use axum::{Router, http::header, routing::get};
use expensio::api::{handlers::api_routes, openapi::ApiDoc};
use expensio::config::CONFIG;
use expensio::core::services::{ExpenseService, ServiceSettings};
use expensio::infrastructure::{
    cache::in_memory::InMemoryCache, files::in_memory::InMemoryFileStore, logging::in_memory::InMemoryLogging,
    notifier::in_memory::InMemoryNotifier, storage::in_memory::InMemoryStorage,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&CONFIG.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!(config = ?*CONFIG, "starting expensio");

    // Initialize storage, logging and collaborators
    let service = Arc::new(ExpenseService::new(
        InMemoryStorage::new(),
        InMemoryLogging::new(),
        InMemoryCache::new(),
        InMemoryFileStore::new(CONFIG.files_public_base_url.clone()),
        InMemoryNotifier::new(),
        ServiceSettings::from_config(&CONFIG),
    ));

    if let Some(admin) = &CONFIG.bootstrap_admin {
        service.ensure_admin(&admin.id, &admin.name, &admin.email).await?;
    }

    let app = Router::new()
        // health check
        .route("/", get(|| async { "OK" }))
        .nest("/api", api_routes(service))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new()) // Gzip compression
        .layer(TimeoutLayer::new(Duration::from_secs(CONFIG.request_timeout_secs)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::PATCH,
                    http::Method::DELETE,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http()); // Request tracing

    // Start server
    let addr = SocketAddr::from(([127, 0, 0, 1], CONFIG.port));
    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
