use crate::AppState;
use crate::api::error::AppError;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct SyncResponse {
    pub status: String,
    pub message: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/api/trigger-push",
    responses(
        (status = 200, description = "Sync cycle ran", body = SyncResponse),
        (status = 400, description = "Nothing staged", body = SyncResponse),
        (status = 502, description = "Cycle aborted before any asset could sync")
    ),
    tag = "sync"
)]
pub async fn trigger_push(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SyncResponse>), AppError> {
    let staged = state
        .staging
        .count()
        .await
        .map_err(|e| AppError::Internal(format!("staging list failed: {e}")))?;
    if staged == 0 {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(SyncResponse {
                status: "error".to_string(),
                message: "No images to push.".to_string(),
                total: 0,
                succeeded: 0,
                failed: Vec::new(),
            }),
        ));
    }

    let outcome = state.engine.run_cycle().await?;

    let failed: Vec<String> = outcome
        .failed
        .iter()
        .map(|a| a.local_name.clone())
        .collect();
    let (status, message) = if outcome.is_clean() {
        (
            "success",
            "Successfully pushed images to the asset repository.",
        )
    } else {
        (
            "partial_failure",
            "Some images could not be pushed; they remain staged.",
        )
    };

    Ok((
        StatusCode::OK,
        Json(SyncResponse {
            status: status.to_string(),
            message: message.to_string(),
            total: outcome.total,
            succeeded: outcome.succeeded,
            failed,
        }),
    ))
}
