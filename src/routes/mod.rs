use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::services::export::ExportError;
use crate::services::workbench::WorkbenchError;

pub mod batch;
pub mod export;
pub mod health;
pub mod items;
pub mod metrics;
pub mod settings;

/// Build the API router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route(
            "/api/v1/items",
            get(items::list_items)
                .post(items::upload_items)
                .delete(items::clear_items),
        )
        .route(
            "/api/v1/items/{id}",
            get(items::get_item).delete(items::remove_item),
        )
        .route("/api/v1/items/{id}/result", get(items::download_result))
        .route("/api/v1/items/{id}/regenerate", post(items::regenerate_item))
        .route("/api/v1/items/{id}/selection", post(items::toggle_selection))
        .route("/api/v1/selection/completed", post(items::select_all_completed))
        .route("/api/v1/batch", post(batch::start_batch))
        .route("/api/v1/export", get(export::export_selected))
        .route(
            "/api/v1/settings/prompts",
            get(settings::get_prompts).put(settings::update_prompts),
        )
        .route("/api/v1/settings/credential", put(settings::set_credential))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
}

/// HTTP status for a workbench failure.
pub(crate) fn error_status(err: &WorkbenchError) -> StatusCode {
    match err {
        WorkbenchError::MissingCredential => StatusCode::PRECONDITION_REQUIRED,
        WorkbenchError::BatchInFlight | WorkbenchError::ItemBusy(_) => StatusCode::CONFLICT,
        WorkbenchError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        WorkbenchError::Export(ExportError::NothingSelected) => StatusCode::NOT_FOUND,
        WorkbenchError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
