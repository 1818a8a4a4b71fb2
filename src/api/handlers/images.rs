use crate::AppState;
use crate::api::error::AppError;
use crate::services::image;
use crate::utils::naming;
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub filename: String,
    pub url: String,
}

#[derive(Serialize, ToSchema)]
pub struct BatchItem {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_filename: Option<String>,
    pub status: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct BatchUploadResponse {
    pub status: String,
    pub message: String,
    pub results: Vec<BatchItem>,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    let msg = e.to_string();
    if msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(msg)
    }
}

/// Validates, normalizes and stages one upload; returns the local name.
async fn stage_upload(
    state: &AppState,
    local_name: String,
    bytes: Vec<u8>,
) -> Result<String, AppError> {
    let ext = local_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_string();
    let max_dimension = state.config.max_dimension;
    let jpeg_quality = state.config.jpeg_quality;

    let normalized = tokio::task::spawn_blocking(move || {
        image::validate_and_normalize(&bytes, &ext, max_dimension, jpeg_quality)
    })
    .await
    .map_err(|e| AppError::Internal(format!("validation task failed: {e}")))??;

    state
        .staging
        .store(&local_name, &normalized)
        .await
        .map_err(|e| AppError::Internal(format!("staging write failed: {e}")))?;

    Ok(local_name)
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = Multipart, description = "Image upload, field name `file`"),
    responses(
        (status = 200, description = "Image accepted and staged", body = UploadResponse),
        (status = 400, description = "Missing file, disallowed extension or invalid image"),
        (status = 413, description = "Payload too large")
    ),
    tag = "images"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(AppError::BadRequest("No file selected".to_string()));
        }
        let Some(local_name) = naming::allocate_name(&original) else {
            return Err(AppError::BadRequest(
                "Invalid file format. Allowed formats: png, jpg, jpeg, gif".to_string(),
            ));
        };

        let bytes = field.bytes().await.map_err(multipart_error)?;
        let staged = stage_upload(&state, local_name, bytes.to_vec()).await?;

        return Ok(Json(UploadResponse {
            status: "success".to_string(),
            message: format!("Image uploaded and saved as: {staged}"),
            url: state.config.asset_url(&staged),
            filename: staged,
        }));
    }

    Err(AppError::BadRequest(
        "No file part in the request".to_string(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/batch-upload",
    request_body(content = Multipart, description = "Image uploads, repeated field name `files`"),
    responses(
        (status = 200, description = "Batch processed, possibly partially", body = BatchUploadResponse),
        (status = 400, description = "No files in the request, or every upload failed", body = BatchUploadResponse)
    ),
    tag = "images"
)]
pub async fn batch_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchUploadResponse>), AppError> {
    let mut results = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("files") {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let Some(local_name) = naming::allocate_name(&original) else {
            results.push(BatchItem {
                filename: original,
                new_filename: None,
                status: "error".to_string(),
                message: "Invalid file format. Allowed formats: png, jpg, jpeg, gif".to_string(),
            });
            continue;
        };

        match stage_upload(&state, local_name, bytes.to_vec()).await {
            Ok(staged) => results.push(BatchItem {
                filename: original,
                message: format!("Image saved as: {staged}"),
                new_filename: Some(staged),
                status: "success".to_string(),
            }),
            Err(AppError::InvalidImage(_)) => results.push(BatchItem {
                filename: original,
                new_filename: None,
                status: "error".to_string(),
                message: "Error processing image. Invalid or corrupted file.".to_string(),
            }),
            Err(e) => return Err(e),
        }
    }

    if results.is_empty() {
        return Err(AppError::BadRequest(
            "No files part in the request".to_string(),
        ));
    }

    let failures = results.iter().filter(|r| r.status == "error").count();
    let (code, status, message) = if failures == results.len() {
        (StatusCode::BAD_REQUEST, "error", "All uploads failed")
    } else if failures > 0 {
        (StatusCode::OK, "partial_success", "Batch upload processed")
    } else {
        (StatusCode::OK, "success", "Batch upload processed")
    };

    Ok((
        code,
        Json(BatchUploadResponse {
            status: status.to_string(),
            message: message.to_string(),
            results,
        }),
    ))
}
