//! Image Asset Store
//!
//! Uploads image assets to S3-compatible object storage under deterministic
//! keys, hands back download URLs, and cleans assets up again by URL.

use actix_web::{web, App, HttpServer, middleware};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_actix_web::TracingLogger;

mod api;
mod assets;
mod config;
mod domain;
mod storage;

use crate::assets::{BlobConverter, BlobRegistry, DereferenceError, Deleter, PathBuilder, Uploader};
use crate::config::Settings;
use crate::storage::ObjectStore;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn ObjectStore>,
    pub uploader: Uploader,
    pub deleter: Deleter,
    pub blobs: BlobConverter,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ObjectStore>,
        paths: PathBuilder,
    ) -> Result<Self, DereferenceError> {
        // Fetched blobs are held to the same limit as uploaded bodies
        let blobs = BlobConverter::new(
            Arc::new(BlobRegistry::from_settings(&settings.blobs)),
            &settings.blobs,
            settings.server.max_body_bytes,
        )?;

        Ok(AppState {
            uploader: Uploader::new(store.clone(), paths),
            deleter: Deleter::new(store.clone(), settings.storage.url_marker.clone()),
            blobs,
            store,
            settings,
            started_at: Instant::now(),
        })
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("image_asset_store=info,actix_web=info"))
        )
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting Image Asset Store v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    let store = storage::connect(&settings.storage)
        .await
        .context("Failed to initialize object store")?;
    info!(
        backend = store.name(),
        bucket = %settings.storage.bucket_name,
        "Object store ready"
    );

    let max_body_bytes = settings.server.max_body_bytes;
    let workers = settings.server.workers.unwrap_or_else(|| num_cpus::get() * 2);

    let app_state = web::Data::new(
        AppState::new(settings, store, PathBuilder::default())
            .context("Failed to initialize blob converter")?
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .app_data(web::JsonConfig::default().limit(max_body_bytes))
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "image-asset-store"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION")))
            )
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
