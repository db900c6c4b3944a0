use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{AcceptedResponse, IngestResponse, ItemView, SelectionResponse};
use crate::models::item::UploadedFile;
use crate::routes::error_status;

fn view(state: &AppState, id: Uuid) -> Option<ItemView> {
    let workbench = &state.workbench;
    workbench
        .item(id)
        .map(|item| ItemView::from_item(&item, workbench.store().is_selected(id)))
}

/// GET /api/v1/items: Every item in upload order.
pub async fn list_items(State(state): State<AppState>) -> Json<Vec<ItemView>> {
    let store = state.workbench.store();
    let views = state
        .workbench
        .items()
        .iter()
        .map(|item| ItemView::from_item(item, store.is_selected(item.id)))
        .collect();
    Json(views)
}

/// POST /api/v1/items: Upload one or more images as multipart file fields.
///
/// The part's file name is used as the item path and may contain `/` for
/// folder uploads.
pub async fn upload_items(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>), StatusCode> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let Some(path) = field.file_name().map(str::to_string) else {
            continue;
        };
        let media_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

        files.push(UploadedFile {
            path,
            media_type,
            bytes: data.to_vec(),
        });
    }

    if files.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let ingested = state.workbench.ingest(files);
    if ingested.items.is_empty() {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    let accepted = ingested
        .items
        .iter()
        .map(|item| ItemView::from_item(item, false))
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            accepted,
            skipped: ingested.skipped,
        }),
    ))
}

/// DELETE /api/v1/items: Remove everything and stop the running batch.
pub async fn clear_items(State(state): State<AppState>) -> StatusCode {
    state.workbench.clear_all();
    StatusCode::NO_CONTENT
}

/// GET /api/v1/items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ItemView>, StatusCode> {
    view(&state, id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// DELETE /api/v1/items/{id}
pub async fn remove_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state
        .workbench
        .remove(id)
        .map_err(|e| error_status(&e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/items/{id}/result: The generated image bytes.
pub async fn download_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let item = state.workbench.item(id).ok_or(StatusCode::NOT_FOUND)?;
    let result = item
        .result
        .filter(|_| item.status.is_success())
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok((
        [(header::CONTENT_TYPE, result.media_type)],
        result.bytes.to_vec(),
    ))
}

/// POST /api/v1/items/{id}/regenerate: Re-run a single item in the background.
pub async fn regenerate_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<AcceptedResponse>), StatusCode> {
    state.workbench.start_regenerate(id).map_err(|e| {
        tracing::warn!(item_id = %id, error = %e, "Regeneration rejected");
        error_status(&e)
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "processing".to_string(),
            message: format!("Regenerating item {id}"),
        }),
    ))
}

/// POST /api/v1/items/{id}/selection: Toggle export selection.
///
/// Items without a result are never selected.
pub async fn toggle_selection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SelectionResponse>, StatusCode> {
    if state.workbench.item(id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    let selected = state.workbench.toggle_selection(id);
    Ok(Json(SelectionResponse { selected }))
}

/// POST /api/v1/selection/completed: Select all finished items, or none.
pub async fn select_all_completed(State(state): State<AppState>) -> Json<SelectionResponse> {
    Json(SelectionResponse {
        selected: state.workbench.select_all_completed(),
    })
}
