pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::staging::StagingStore;
use crate::services::sync::SyncEngine;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::images::upload_image,
        api::handlers::images::batch_upload,
        api::handlers::sync::trigger_push,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::images::UploadResponse,
            api::handlers::images::BatchItem,
            api::handlers::images::BatchUploadResponse,
            api::handlers::sync::SyncResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "images", description = "Image upload endpoints"),
        (name = "sync", description = "Staging-to-remote synchronization"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub staging: Arc<StagingStore>,
    pub engine: Arc<SyncEngine>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::handlers::pages::upload_page))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/upload", post(api::handlers::images::upload_image))
        .route("/api/batch-upload", post(api::handlers::images::batch_upload))
        .route("/api/trigger-push", post(api::handlers::sync::trigger_push))
        .with_state(state)
}
