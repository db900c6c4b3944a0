use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use crate::app_state::AppState;
use crate::routes::error_status;
use crate::services::export::ARCHIVE_FILE_NAME;

/// GET /api/v1/export: Zip archive of every selected result.
pub async fn export_selected(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let archive = state.workbench.export_selected().map_err(|e| {
        tracing::warn!(error = %e, "Export failed");
        error_status(&e)
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_FILE_NAME}\""),
            ),
        ],
        archive,
    ))
}
