//! Snapvault - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snapvault_backend::{
    api,
    config::Config,
    db,
    error::Result,
    services::{
        backup_service::BackupService, notification_service::NotificationService,
        restore_service::RestoreService, scheduler_service::SchedulerService,
    },
    storage::StorageService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapvault_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting Snapvault");

    // Connect to database
    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // Storage gateway for sealed artifacts
    let storage = Arc::new(StorageService::from_config(&config).await?);
    tracing::info!(backend = %config.storage_backend, "Storage gateway ready");

    // Notification sink; subscribers attach out-of-process adapters
    let notifications = Arc::new(NotificationService::new(
        64,
        config.notify_on_success,
        config.notify_on_failure,
    ));

    // Orchestrators
    let backup_service = Arc::new(BackupService::new(
        db_pool.clone(),
        storage.clone(),
        config.clone(),
        notifications.clone(),
    ));
    let restore_service = Arc::new(RestoreService::new(
        db_pool.clone(),
        storage,
        config.clone(),
        notifications,
        backup_service.clone(),
    ));

    // Arm timers for all enabled schedules
    let scheduler = Arc::new(SchedulerService::new(db_pool.clone(), backup_service.clone()));
    scheduler.start().await?;

    let state = Arc::new(api::AppState::new(
        config.clone(),
        db_pool,
        backup_service,
        restore_service,
        scheduler,
    ));

    // Build router
    let app = Router::new()
        .merge(api::routes::create_router(state))
        .layer({
            // In production the operator console is served from the same
            // origin; in development it runs on a different port and must
            // be whitelisted explicitly.
            if std::env::var("ENVIRONMENT").unwrap_or_default() == "development" {
                let origins: Vec<_> = std::env::var("CORS_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".into())
                    .split(',')
                    .map(|s| s.trim().parse().expect("invalid CORS origin"))
                    .collect();
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PATCH,
                        Method::DELETE,
                        Method::OPTIONS,
                    ])
                    .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                    .allow_credentials(true)
            } else {
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        })
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
