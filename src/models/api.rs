use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::item::{WorkItem, WorkStatus};

/// Item summary returned by the API. Binary payloads are fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemView {
    pub id: Uuid,
    pub relative_path: String,
    pub status: WorkStatus,
    pub error_message: Option<String>,
    pub source_media_type: String,
    pub result_media_type: Option<String>,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemView {
    pub fn from_item(item: &WorkItem, selected: bool) -> Self {
        Self {
            id: item.id,
            relative_path: item.relative_path.clone(),
            status: item.status,
            error_message: item.error_message.clone(),
            source_media_type: item.source.media_type.clone(),
            result_media_type: item.result.as_ref().map(|r| r.media_type.clone()),
            selected,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

/// Response after uploading files.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: Vec<ItemView>,
    pub skipped: usize,
}

/// Response after asking for a batch run or a regeneration.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub status: String,
    pub message: String,
}

/// Current selection after a toggle.
#[derive(Debug, Serialize, Deserialize)]
pub struct SelectionResponse {
    pub selected: Vec<Uuid>,
}

/// Editable prompt settings. The consistency descriptor is fixed per process.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PromptSettingsRequest {
    #[garde(length(min = 1, max = 2000))]
    pub model_description: String,

    #[garde(length(min = 1, max = 2000))]
    pub background_description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptSettingsResponse {
    pub model_description: String,
    pub background_description: String,
    pub consistency_descriptor: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CredentialRequest {
    #[garde(length(min = 1, max = 512))]
    pub api_key: String,
}
