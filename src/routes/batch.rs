use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::AcceptedResponse;
use crate::routes::error_status;

/// POST /api/v1/batch: Process every unfinished item in the background.
///
/// Progress is observed by polling `GET /api/v1/items`.
pub async fn start_batch(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AcceptedResponse>), StatusCode> {
    let pending = state.workbench.store().len();
    state.workbench.start_batch().map_err(|e| {
        tracing::warn!(error = %e, "Batch request rejected");
        error_status(&e)
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "processing".to_string(),
            message: format!("Batch started over {pending} item(s)"),
        }),
    ))
}
