//! Transient blob registration endpoints

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::assets::{request_content_type, ErrorResponse};
use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct BlobResponse {
    /// Reference to pass to `from-blob` uploads
    pub blob_ref: String,
    pub size_bytes: usize,
}

/// POST /api/v1/blobs - Hold bytes as a transient blob
#[utoipa::path(
    post,
    path = "/api/v1/blobs",
    tag = "blobs",
    request_body(content = Vec<u8>, content_type = "application/octet-stream", description = "Blob bytes"),
    responses(
        (status = 201, description = "Blob registered", body = BlobResponse),
        (status = 400, description = "Empty body", body = ErrorResponse),
        (status = 507, description = "Blob registry full", body = ErrorResponse)
    )
)]
pub async fn register_blob(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    if body.is_empty() {
        return HttpResponse::BadRequest()
            .json(ErrorResponse::new("EMPTY_BODY", "Request body must not be empty"));
    }

    let size_bytes = body.len();
    let mime_type = request_content_type(&req).map(String::from);
    match state.blobs.registry().register(body, mime_type) {
        Ok(blob_ref) => HttpResponse::Created().json(BlobResponse { blob_ref, size_bytes }),
        Err(e) => {
            warn!(error = %e, "Blob registration refused");
            HttpResponse::build(StatusCode::INSUFFICIENT_STORAGE)
                .json(ErrorResponse::new("REGISTRY_FULL", e.to_string()))
        }
    }
}

/// DELETE /api/v1/blobs/{blob_id} - Release a transient blob
#[utoipa::path(
    delete,
    path = "/api/v1/blobs/{blob_id}",
    tag = "blobs",
    params(
        ("blob_id" = String, Path, description = "Blob UUID, with or without the `blob:` prefix")
    ),
    responses(
        (status = 204, description = "Blob released"),
        (status = 404, description = "Blob unknown or already released", body = ErrorResponse)
    )
)]
pub async fn release_blob(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let blob_id = path.into_inner();

    if state.blobs.registry().release(&blob_id) {
        debug!(blob_id = %blob_id, "Released blob");
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(ErrorResponse::new(
            "BLOB_NOT_FOUND",
            format!("Blob '{}' does not exist", blob_id),
        ))
    }
}
