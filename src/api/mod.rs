//! API module - HTTP routes and handlers

pub mod handlers;
pub mod openapi;

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::scope("/assets")
                    .route("", web::delete().to(handlers::assets::delete_asset))
                    .route(
                        "/user/{owner_id}/{artifact_id}/from-blob",
                        web::post().to(handlers::assets::upload_user_asset_from_blob),
                    )
                    .route("/user/{owner_id}/{artifact_id}", web::post().to(handlers::assets::upload_user_asset))
                    .route("/generated/{owner_id}/{artifact_id}", web::post().to(handlers::assets::upload_generated_asset))
            )
            .service(
                web::scope("/blobs")
                    .route("", web::post().to(handlers::blobs::register_blob))
                    .route("/{blob_id}", web::delete().to(handlers::blobs::release_blob))
            )
    )
    .route("/health", web::get().to(handlers::health::health_check))
    // Swagger UI and OpenAPI spec
    .service(
        SwaggerUi::new("/swagger-ui/{_:.*}")
            .url("/api-docs/openapi.json", ApiDoc::openapi())
    );
}
