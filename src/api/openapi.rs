//! OpenAPI 3.0 specification definition

use utoipa::OpenApi;

use crate::api::handlers::{
    assets::{ApiError, DeleteAssetRequest, DeleteResponse, ErrorResponse, FromBlobRequest, UploadResponse},
    blobs::BlobResponse,
    health::HealthResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Image Asset Store API",
        version = "1.0.0",
        description = "Upload, download URL and cleanup service for image assets",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "assets", description = "Asset upload and delete endpoints"),
        (name = "blobs", description = "Transient blob endpoints")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::assets::upload_user_asset,
        crate::api::handlers::assets::upload_user_asset_from_blob,
        crate::api::handlers::assets::upload_generated_asset,
        crate::api::handlers::assets::delete_asset,
        crate::api::handlers::blobs::register_blob,
        crate::api::handlers::blobs::release_blob,
    ),
    components(
        schemas(
            HealthResponse,
            UploadResponse,
            FromBlobRequest,
            DeleteAssetRequest,
            DeleteResponse,
            ErrorResponse,
            ApiError,
            BlobResponse,
        )
    )
)]
pub struct ApiDoc;
