//! Health check endpoint

use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// Object store backend in use
    pub storage_backend: &'static str,
    pub bucket: String,
    pub blobs_registered: usize,
}

/// GET /health - Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        storage_backend: state.store.name(),
        bucket: state.settings.storage.bucket_name.clone(),
        blobs_registered: state.blobs.registry().len(),
    };

    HttpResponse::Ok().json(response)
}

#[cfg(test)]
mod tests {
    use actix_web::{test, web, App};
    use serde_json::Value;
    use std::sync::Arc;

    use crate::api::configure_routes;
    use crate::assets::PathBuilder;
    use crate::config::Settings;
    use crate::storage::{DownloadUrlCodec, MemoryObjectStore};
    use crate::AppState;

    #[actix_web::test]
    async fn test_health_reports_backend() {
        let store = Arc::new(MemoryObjectStore::new(DownloadUrlCodec::new("http://localhost", "/o/", None)));
        let state = web::Data::new(AppState::new(Settings::default(), store, PathBuilder::default()).unwrap());
        let app = test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage_backend"], "memory");
        assert_eq!(body["bucket"], "image-assets");
        assert_eq!(body["blobs_registered"], 0);
    }
}
