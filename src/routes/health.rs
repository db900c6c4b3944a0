use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub credential_configured: bool,
    pub batch_in_flight: bool,
    pub items: usize,
}

/// GET /health: Liveness plus readiness to run a batch.
///
/// Reports `degraded` while no credential is configured: items can be
/// uploaded but not processed.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let workbench = &state.workbench;
    let credential_configured = workbench.credential_configured();

    let response = HealthResponse {
        status: if credential_configured {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            credential_configured,
            batch_in_flight: workbench.is_batch_running(),
            items: workbench.store().len(),
        },
    };

    (StatusCode::OK, Json(response))
}
