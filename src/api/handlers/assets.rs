//! Asset upload and delete endpoints

use actix_web::{http::header::CONTENT_TYPE, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::assets::{DeleteOutcome, DereferenceError, UploadError};
use crate::domain::{UploadableFile, UploadedAsset};
use crate::AppState;

/// Query parameters for raw user uploads
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Original file name; its extension is kept in the storage key
    pub file_name: String,
}

/// Request body for uploading a previously registered blob
#[derive(Debug, Deserialize, ToSchema)]
pub struct FromBlobRequest {
    /// `blob:{uuid}`, `data:` URL or `http(s)` URL
    pub blob_ref: String,
    pub file_name: String,
}

/// Request body for deleting an asset by download URL
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteAssetRequest {
    pub url: String,
}

/// Response for a successful upload
#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    /// Storage key the asset was written to
    pub key: String,
    /// Download URL to persist alongside the artifact
    pub url: String,
}

impl From<UploadedAsset> for UploadResponse {
    fn from(asset: UploadedAsset) -> Self {
        UploadResponse {
            success: true,
            key: asset.key.into_string(),
            url: asset.url.into_string(),
        }
    }
}

/// Response for a delete request; always successful
#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    /// `deleted`, `not_found`, `ignored` or `suppressed`, with details
    #[schema(value_type = Object)]
    pub result: DeleteOutcome,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

#[derive(Serialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        ErrorResponse {
            success: false,
            error: ApiError {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

/// Content type the client sent, if any
pub(crate) fn request_content_type(req: &HttpRequest) -> Option<&str> {
    req.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

fn empty_body() -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new("EMPTY_BODY", "Request body must not be empty"))
}

fn upload_failed(e: &UploadError) -> HttpResponse {
    error!(error = %e, "Asset upload failed");
    HttpResponse::BadGateway().json(ErrorResponse::new("UPLOAD_FAILED", e.to_string()))
}

fn blob_unavailable(e: &DereferenceError) -> HttpResponse {
    warn!(error = %e, "Blob could not be dereferenced");
    HttpResponse::UnprocessableEntity().json(ErrorResponse::new("BLOB_UNAVAILABLE", e.to_string()))
}

/// POST /api/v1/assets/user/{owner_id}/{artifact_id} - Upload a user image
#[utoipa::path(
    post,
    path = "/api/v1/assets/user/{owner_id}/{artifact_id}",
    tag = "assets",
    params(
        ("owner_id" = String, Path, description = "Owner of the asset"),
        ("artifact_id" = String, Path, description = "Artifact the image belongs to"),
        UploadQuery
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream", description = "Raw image bytes"),
    responses(
        (status = 201, description = "Asset uploaded", body = UploadResponse),
        (status = 400, description = "Empty body", body = ErrorResponse),
        (status = 502, description = "Object store rejected the upload", body = ErrorResponse)
    )
)]
pub async fn upload_user_asset(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<UploadQuery>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let (owner_id, artifact_id) = path.into_inner();

    if body.is_empty() {
        return empty_body();
    }

    let file = UploadableFile::with_reported_type(body, query.into_inner().file_name, request_content_type(&req));

    info!(
        owner_id = %owner_id,
        artifact_id = %artifact_id,
        size = file.size(),
        mime_type = %file.mime_type,
        "Uploading user asset"
    );

    match state.uploader.upload_user_asset(&owner_id, &artifact_id, file).await {
        Ok(asset) => HttpResponse::Created().json(UploadResponse::from(asset)),
        Err(e) => upload_failed(&e),
    }
}

/// POST /api/v1/assets/user/{owner_id}/{artifact_id}/from-blob - Upload a blob reference
#[utoipa::path(
    post,
    path = "/api/v1/assets/user/{owner_id}/{artifact_id}/from-blob",
    tag = "assets",
    params(
        ("owner_id" = String, Path, description = "Owner of the asset"),
        ("artifact_id" = String, Path, description = "Artifact the image belongs to")
    ),
    request_body = FromBlobRequest,
    responses(
        (status = 201, description = "Asset uploaded", body = UploadResponse),
        (status = 422, description = "Blob reference invalid, released, refused or too large", body = ErrorResponse),
        (status = 502, description = "Object store rejected the upload", body = ErrorResponse)
    )
)]
pub async fn upload_user_asset_from_blob(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<FromBlobRequest>,
) -> HttpResponse {
    let (owner_id, artifact_id) = path.into_inner();

    let file = match state.blobs.materialize(&body.blob_ref, &body.file_name).await {
        Ok(file) => file,
        Err(e) => return blob_unavailable(&e),
    };

    match state.uploader.upload_user_asset(&owner_id, &artifact_id, file).await {
        Ok(asset) => HttpResponse::Created().json(UploadResponse::from(asset)),
        Err(e) => upload_failed(&e),
    }
}

/// POST /api/v1/assets/generated/{owner_id}/{artifact_id} - Upload a generated PNG
#[utoipa::path(
    post,
    path = "/api/v1/assets/generated/{owner_id}/{artifact_id}",
    tag = "assets",
    params(
        ("owner_id" = String, Path, description = "Owner the image was generated for"),
        ("artifact_id" = String, Path, description = "Artifact the image belongs to")
    ),
    request_body(content = Vec<u8>, content_type = "image/png", description = "PNG bytes"),
    responses(
        (status = 201, description = "Asset uploaded", body = UploadResponse),
        (status = 400, description = "Empty body", body = ErrorResponse),
        (status = 502, description = "Object store rejected the upload", body = ErrorResponse)
    )
)]
pub async fn upload_generated_asset(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Bytes,
) -> HttpResponse {
    let (owner_id, artifact_id) = path.into_inner();

    if body.is_empty() {
        return empty_body();
    }

    match state.uploader.upload_generated_asset(&owner_id, &artifact_id, body).await {
        Ok(asset) => HttpResponse::Created().json(UploadResponse::from(asset)),
        Err(e) => upload_failed(&e),
    }
}

/// DELETE /api/v1/assets - Delete an asset by download URL
///
/// Never fails: unknown URLs, missing objects and store errors all answer 200
/// with the outcome describing what happened.
#[utoipa::path(
    delete,
    path = "/api/v1/assets",
    tag = "assets",
    request_body = DeleteAssetRequest,
    responses(
        (status = 200, description = "Delete attempted", body = DeleteResponse)
    )
)]
pub async fn delete_asset(
    state: web::Data<AppState>,
    body: web::Json<DeleteAssetRequest>,
) -> HttpResponse {
    let result = state.deleter.delete_by_url(&body.url).await;
    HttpResponse::Ok().json(DeleteResponse { success: true, result })
}
