use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{ApiKey, SharedCredential};
use crate::models::item::{SourceImage, UploadedFile, WorkItem};
use crate::services::export::{self, ExportError};
use crate::services::gemini::ImageGenerator;
use crate::services::orchestrator::FallbackOrchestrator;
use crate::services::prompts::PromptSettings;
use crate::services::safety::{KeywordClassifier, SafetyClassifier};
use crate::services::scheduler::{BatchScheduler, BatchSummary, SchedulerError};
use crate::services::store::{AttemptPolicy, BeginError, WorkItemStore};

/// Entry point for every user-facing operation on a batch.
pub struct Workbench {
    store: Arc<WorkItemStore>,
    scheduler: BatchScheduler,
    credential: SharedCredential,
    prompts: RwLock<PromptSettings>,
}

/// Result of an ingestion call.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub items: Vec<WorkItem>,
    /// Files dropped because they are not images.
    pub skipped: usize,
}

impl Workbench {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        credential: SharedCredential,
        prompts: PromptSettings,
        pacing: Duration,
    ) -> Self {
        Self::with_classifier(
            generator,
            Arc::new(KeywordClassifier),
            credential,
            prompts,
            pacing,
        )
    }

    pub fn with_classifier(
        generator: Arc<dyn ImageGenerator>,
        classifier: Arc<dyn SafetyClassifier>,
        credential: SharedCredential,
        prompts: PromptSettings,
        pacing: Duration,
    ) -> Self {
        let store = Arc::new(WorkItemStore::new());
        let orchestrator = Arc::new(FallbackOrchestrator::new(generator, classifier));
        let scheduler = BatchScheduler::new(Arc::clone(&store), orchestrator, pacing);
        Self {
            store,
            scheduler,
            credential,
            prompts: RwLock::new(prompts),
        }
    }

    pub fn store(&self) -> &WorkItemStore {
        &self.store
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.store.snapshot()
    }

    pub fn item(&self, id: Uuid) -> Option<WorkItem> {
        self.store.get(id)
    }

    pub fn is_batch_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn credential_configured(&self) -> bool {
        self.credential.is_configured()
    }

    /// Replace the credential. Doing so mid-batch is undefined.
    pub fn set_credential(&self, key: Option<ApiKey>) {
        self.credential.set(key);
    }

    pub fn prompt_settings(&self) -> PromptSettings {
        self.prompts.read().clone()
    }

    /// Update the model and background descriptions. Runs already in flight
    /// keep the settings they started with.
    pub fn update_prompts(&self, model_description: String, background_description: String) {
        let mut prompts = self.prompts.write();
        prompts.model_description = model_description;
        prompts.background_description = background_description;
    }

    /// Add uploaded files as pending items. Non-image files are dropped.
    pub fn ingest(&self, files: Vec<UploadedFile>) -> Ingested {
        let total = files.len();
        let items: Vec<WorkItem> = files
            .into_iter()
            .filter_map(|file| {
                let media_type = resolve_media_type(&file)?;
                let path = normalize_relative_path(&file.path);
                Some(WorkItem::new(path, SourceImage::new(media_type, file.bytes)))
            })
            .collect();
        let skipped = total - items.len();

        let items = self.store.append(items);
        tracing::info!(accepted = items.len(), skipped, "Ingested upload");
        Ingested { items, skipped }
    }

    pub fn remove(&self, id: Uuid) -> Result<WorkItem, WorkbenchError> {
        self.store.remove(id).ok_or(WorkbenchError::ItemNotFound(id))
    }

    /// Empty the store and selection and stop scheduling. A request already
    /// sent completes, but its result is discarded.
    pub fn clear_all(&self) {
        self.scheduler.cancel();
        self.store.clear();
        tracing::info!("Cleared all items");
    }

    pub fn toggle_selection(&self, id: Uuid) -> Vec<Uuid> {
        self.store.toggle_selection(id);
        self.store.selected_ids()
    }

    pub fn select_all_completed(&self) -> Vec<Uuid> {
        self.store.select_all_completed()
    }

    pub fn selected_ids(&self) -> Vec<Uuid> {
        self.store.selected_ids()
    }

    pub fn export_selected(&self) -> Result<Vec<u8>, WorkbenchError> {
        let selected = self.store.selected_items();
        Ok(export::build_archive(&selected)?)
    }

    /// Run a batch to completion on the current task.
    pub async fn run_batch(&self) -> Result<BatchSummary, WorkbenchError> {
        self.ensure_credential()?;
        let guard = self.scheduler.try_acquire()?;
        Ok(self.scheduler.run(guard, self.prompt_settings()).await)
    }

    /// Start a batch in the background. Re-entry is rejected before returning.
    pub fn start_batch(self: &Arc<Self>) -> Result<JoinHandle<BatchSummary>, WorkbenchError> {
        self.ensure_credential()?;
        let guard = self.scheduler.try_acquire()?;
        let prompts = self.prompt_settings();
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.scheduler.run(guard, prompts).await
        }))
    }

    /// Re-run one item from `Pending`, overwriting its previous outcome.
    pub async fn regenerate(&self, id: Uuid) -> Result<WorkItem, WorkbenchError> {
        self.ensure_credential()?;
        let prompts = self.prompt_settings();
        self.scheduler
            .process_item(id, AttemptPolicy::Regenerate, &prompts)
            .await
            .map_err(|err| WorkbenchError::from_begin(id, err))?
            .ok_or(WorkbenchError::ItemNotFound(id))
    }

    /// Background variant of [`Workbench::regenerate`]. The item is moved to
    /// `Processing` before this returns.
    pub fn start_regenerate(
        self: &Arc<Self>,
        id: Uuid,
    ) -> Result<JoinHandle<Option<WorkItem>>, WorkbenchError> {
        self.ensure_credential()?;
        let prompts = self.prompt_settings();
        // Claiming the item here makes busy/not-found errors synchronous.
        let source = self
            .store
            .begin_attempt(id, AttemptPolicy::Regenerate)
            .map_err(|err| WorkbenchError::from_begin(id, err))?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.scheduler.finish_claimed(id, source, &prompts).await
        }))
    }

    fn ensure_credential(&self) -> Result<(), WorkbenchError> {
        if self.credential.is_configured() {
            Ok(())
        } else {
            Err(WorkbenchError::MissingCredential)
        }
    }
}

/// Forward-slash path with no empty, `.` or `..` segments. Archive entry
/// names are derived from it.
pub fn normalize_relative_path(raw: &str) -> String {
    let cleaned = raw
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect::<Vec<_>>()
        .join("/");
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

fn resolve_media_type(file: &UploadedFile) -> Option<String> {
    let declared = file
        .media_type
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty() && *m != "application/octet-stream");

    match declared {
        Some(media_type) if media_type.starts_with("image/") => Some(media_type.to_string()),
        Some(_) => None,
        None => image::guess_format(&file.bytes)
            .ok()
            .map(|format| format.to_mime_type().to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkbenchError {
    #[error("No API key configured")]
    MissingCredential,

    #[error("A batch is already in flight")]
    BatchInFlight,

    #[error("Item {0} not found")]
    ItemNotFound(Uuid),

    #[error("Item {0} is already being processed")]
    ItemBusy(Uuid),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl WorkbenchError {
    fn from_begin(id: Uuid, err: BeginError) -> Self {
        match err {
            BeginError::Busy => Self::ItemBusy(id),
            // Regeneration never reports AlreadySucceeded.
            BeginError::NotFound | BeginError::AlreadySucceeded => Self::ItemNotFound(id),
        }
    }
}

impl From<SchedulerError> for WorkbenchError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyRunning => Self::BatchInFlight,
        }
    }
}
