use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub staged_files: usize,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health and staging backlog", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let staged_files = state.staging.count().await.unwrap_or(0);

    Json(HealthResponse {
        status: "ok".to_string(),
        staged_files,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
