use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Processing,
    Completed,
    /// Generated with the fallback prompt: model removed, detail shot only.
    Fallback,
    Error,
}

impl WorkStatus {
    /// `Completed` or `Fallback`.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::Fallback)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Fallback | Self::Error)
    }
}

/// Uploaded image payload. Immutable; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl SourceImage {
    pub fn new(media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Image returned by the Generation API, already base64-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl GeneratedImage {
    pub fn new(media_type: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// One uploaded image plus its generation state.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: Uuid,
    pub source: SourceImage,
    pub relative_path: String,
    pub result: Option<GeneratedImage>,
    pub status: WorkStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(relative_path: impl Into<String>, source: SourceImage) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source,
            relative_path: relative_path.into(),
            result: None,
            status: WorkStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the item can be selected for export.
    pub fn has_result(&self) -> bool {
        self.status.is_success() && self.result.is_some()
    }
}

/// A file handed to ingestion by an upload surface.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Display path; the browser's relative path or the bare file name.
    pub path: String,
    /// Declared media type, if the surface knows one.
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Terminal result of one orchestrated attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Completed(GeneratedImage),
    Fallback(GeneratedImage),
    Failed(String),
}

impl AttemptOutcome {
    pub fn status(&self) -> WorkStatus {
        match self {
            Self::Completed(_) => WorkStatus::Completed,
            Self::Fallback(_) => WorkStatus::Fallback,
            Self::Failed(_) => WorkStatus::Error,
        }
    }
}
