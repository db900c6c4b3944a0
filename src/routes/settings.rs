use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::config::ApiKey;
use crate::models::api::{CredentialRequest, PromptSettingsRequest, PromptSettingsResponse};

fn prompt_response(state: &AppState) -> PromptSettingsResponse {
    let prompts = state.workbench.prompt_settings();
    PromptSettingsResponse {
        model_description: prompts.model_description,
        background_description: prompts.background_description,
        consistency_descriptor: prompts.consistency_descriptor,
    }
}

/// GET /api/v1/settings/prompts
pub async fn get_prompts(State(state): State<AppState>) -> Json<PromptSettingsResponse> {
    Json(prompt_response(&state))
}

/// PUT /api/v1/settings/prompts: Applies to the next batch or regeneration.
pub async fn update_prompts(
    State(state): State<AppState>,
    Json(request): Json<PromptSettingsRequest>,
) -> Result<Json<PromptSettingsResponse>, StatusCode> {
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    state
        .workbench
        .update_prompts(request.model_description, request.background_description);
    tracing::info!("Prompt settings updated");
    Ok(Json(prompt_response(&state)))
}

/// PUT /api/v1/settings/credential: The key is kept in memory only.
pub async fn set_credential(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Result<StatusCode, StatusCode> {
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;
    let key = ApiKey::new(request.api_key).ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;

    state.workbench.set_credential(Some(key));
    tracing::info!("API credential updated");
    Ok(StatusCode::NO_CONTENT)
}
