use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::item::{SourceImage, WorkItem, WorkStatus};
use crate::services::orchestrator::FallbackOrchestrator;
use crate::services::prompts::PromptSettings;
use crate::services::store::{AttemptPolicy, BeginError, WorkItemStore};

/// Walks the store sequentially and runs the fallback orchestrator per item.
///
/// Only one batch runs at a time. Iteration is by identifier over a snapshot
/// taken at batch start, so items removed mid-run are skipped.
pub struct BatchScheduler {
    store: Arc<WorkItemStore>,
    orchestrator: Arc<FallbackOrchestrator>,
    pacing: Duration,
    current_run: Arc<Mutex<Option<Uuid>>>,
}

/// Exclusive right to run one batch. Released on drop unless the run was
/// cancelled and a newer one took over.
pub struct RunGuard {
    slot: Arc<Mutex<Option<Uuid>>>,
    run_id: Uuid,
}

impl RunGuard {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn is_current(&self) -> bool {
        *self.slot.lock() == Some(self.run_id)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if *slot == Some(self.run_id) {
            *slot = None;
        }
    }
}

/// Per-run tallies. Failures are reported per item, never as a batch error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub attempted: usize,
    pub skipped: usize,
    pub completed: usize,
    pub fallback: usize,
    pub failed: usize,
    /// Items removed while their request was in flight.
    pub removed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    fn record(&mut self, status: WorkStatus) {
        match status {
            WorkStatus::Completed => self.completed += 1,
            WorkStatus::Fallback => self.fallback += 1,
            _ => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("a batch is already in flight")]
    AlreadyRunning,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<WorkItemStore>,
        orchestrator: Arc<FallbackOrchestrator>,
        pacing: Duration,
    ) -> Self {
        Self {
            store,
            orchestrator,
            pacing,
            current_run: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current_run.lock().is_some()
    }

    /// Claim the batch slot without starting work.
    pub fn try_acquire(&self) -> Result<RunGuard, SchedulerError> {
        let mut slot = self.current_run.lock();
        if slot.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }
        let run_id = Uuid::new_v4();
        *slot = Some(run_id);
        Ok(RunGuard {
            slot: Arc::clone(&self.current_run),
            run_id,
        })
    }

    /// Stop scheduling further items. A request already sent is not aborted.
    pub fn cancel(&self) {
        if let Some(run_id) = self.current_run.lock().take() {
            tracing::info!(run_id = %run_id, "Batch cancelled");
        }
    }

    pub async fn run_batch(&self, prompts: PromptSettings) -> Result<BatchSummary, SchedulerError> {
        let guard = self.try_acquire()?;
        Ok(self.run(guard, prompts).await)
    }

    /// Process every item not already `Completed`/`Fallback`, in store order.
    pub async fn run(&self, guard: RunGuard, prompts: PromptSettings) -> BatchSummary {
        let mut summary = BatchSummary {
            run_id: guard.run_id(),
            ..BatchSummary::default()
        };
        let ids = self.store.ids();

        tracing::info!(run_id = %summary.run_id, items = ids.len(), "Starting batch");
        metrics::counter!("restyle_batches_total").increment(1);

        for id in ids {
            if !guard.is_current() {
                summary.cancelled = true;
                break;
            }

            match self
                .process_item(id, AttemptPolicy::SkipSucceeded, &prompts)
                .await
            {
                Ok(Some(item)) => {
                    summary.attempted += 1;
                    summary.record(item.status);
                }
                Ok(None) => {
                    summary.attempted += 1;
                    summary.removed += 1;
                }
                Err(reason) => {
                    tracing::debug!(item_id = %id, reason = %reason, "Skipping item");
                    summary.skipped += 1;
                    continue;
                }
            }

            metrics::gauge!("restyle_queue_pending")
                .set(self.store.count_with_status(WorkStatus::Pending) as f64);
            sleep(self.pacing).await;
        }

        tracing::info!(
            run_id = %summary.run_id,
            attempted = summary.attempted,
            skipped = summary.skipped,
            completed = summary.completed,
            fallback = summary.fallback,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Batch finished"
        );
        summary
    }

    /// Run one item through the orchestrator and store its outcome.
    ///
    /// Returns `Ok(None)` when the item disappeared while in flight.
    pub async fn process_item(
        &self,
        id: Uuid,
        policy: AttemptPolicy,
        prompts: &PromptSettings,
    ) -> Result<Option<WorkItem>, BeginError> {
        let source = self.store.begin_attempt(id, policy)?;
        Ok(self.finish_claimed(id, source, prompts).await)
    }

    /// Complete an item already moved to `Processing` by
    /// [`WorkItemStore::begin_attempt`].
    pub async fn finish_claimed(
        &self,
        id: Uuid,
        source: SourceImage,
        prompts: &PromptSettings,
    ) -> Option<WorkItem> {
        let start = Instant::now();

        tracing::info!(item_id = %id, "Processing item");
        let outcome = self.orchestrator.run(&source, prompts).await;
        let elapsed = start.elapsed();

        let status = outcome.status();
        metrics::histogram!("restyle_item_processing_seconds").record(elapsed.as_secs_f64());
        metrics::counter!("restyle_items_total", "outcome" => status.to_string()).increment(1);

        let updated = self.store.finish_attempt(id, outcome);
        match &updated {
            Some(item) => tracing::info!(
                item_id = %id,
                path = %item.relative_path,
                outcome = %status,
                duration_ms = elapsed.as_millis() as u64,
                error = item.error_message.as_deref().unwrap_or(""),
                "Item finished"
            ),
            None => tracing::info!(item_id = %id, "Item removed while in flight"),
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gemini::GenerationError;
    use crate::services::orchestrator::tests::{png, ScriptedGenerator};
    use crate::services::safety::KeywordClassifier;

    fn setup(
        paths: &[&str],
        script: Vec<Result<crate::models::item::GeneratedImage, GenerationError>>,
    ) -> (Arc<WorkItemStore>, Arc<ScriptedGenerator>, BatchScheduler, Vec<Uuid>) {
        let store = Arc::new(WorkItemStore::new());
        let items = store.append(
            paths
                .iter()
                .map(|p| WorkItem::new(*p, SourceImage::new("image/jpeg", p.as_bytes().to_vec())))
                .collect(),
        );
        let ids = items.iter().map(|i| i.id).collect();
        let generator = ScriptedGenerator::new(script);
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            generator.clone(),
            Arc::new(KeywordClassifier),
        ));
        let scheduler = BatchScheduler::new(store.clone(), orchestrator, Duration::ZERO);
        (store, generator, scheduler, ids)
    }

    fn statuses(store: &WorkItemStore) -> Vec<WorkStatus> {
        store.snapshot().into_iter().map(|i| i.status).collect()
    }

    #[tokio::test]
    async fn safety_rejected_middle_item_ends_as_fallback() {
        let (store, generator, scheduler, _) = setup(
            &["1.jpg", "2.jpg", "3.jpg"],
            vec![
                Ok(png("one")),
                Err(GenerationError::SafetyBlocked),
                Ok(png("two-detail")),
                Ok(png("three")),
            ],
        );

        let summary = scheduler.run_batch(PromptSettings::default()).await.unwrap();

        assert_eq!(
            statuses(&store),
            [WorkStatus::Completed, WorkStatus::Fallback, WorkStatus::Completed]
        );
        assert_eq!(store.snapshot()[1].result, Some(png("two-detail")));
        assert_eq!(
            generator.prompts.lock()[2],
            PromptSettings::default().fallback_prompt()
        );
        assert_eq!((summary.completed, summary.fallback, summary.failed), (2, 1, 0));
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn every_item_is_terminal_after_a_run_even_with_errors() {
        let (store, _, scheduler, _) = setup(
            &["a.jpg", "b.jpg", "c.jpg"],
            vec![
                Err(GenerationError::NoOutput),
                Ok(png("b")),
                Err(GenerationError::Provider("quota exceeded".into())),
            ],
        );

        scheduler.run_batch(PromptSettings::default()).await.unwrap();

        let items = store.snapshot();
        assert!(items.iter().all(|i| i.status.is_terminal()));
        assert_eq!(items[0].error_message.as_deref(), Some("No image returned."));
        assert_eq!(items[2].error_message.as_deref(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn second_run_skips_succeeded_items_and_retries_errors() {
        let (store, generator, scheduler, _) = setup(
            &["a.jpg", "b.jpg"],
            vec![Ok(png("a")), Err(GenerationError::NoOutput), Ok(png("b"))],
        );

        scheduler.run_batch(PromptSettings::default()).await.unwrap();
        let first = store.snapshot();
        let summary = scheduler.run_batch(PromptSettings::default()).await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.attempted, 1);
        assert_eq!(generator.calls(), 3);
        let second = store.snapshot();
        assert_eq!(second[0].result, first[0].result);
        assert_eq!(second[0].updated_at, first[0].updated_at);
        assert_eq!(second[1].status, WorkStatus::Completed);
    }

    #[tokio::test]
    async fn rerun_without_changes_leaves_successes_untouched() {
        let (store, generator, scheduler, _) =
            setup(&["a.jpg", "b.jpg"], vec![Ok(png("a")), Ok(png("b"))]);

        scheduler.run_batch(PromptSettings::default()).await.unwrap();
        let summary = scheduler.run_batch(PromptSettings::default()).await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(generator.calls(), 2);
        assert_eq!(statuses(&store), [WorkStatus::Completed, WorkStatus::Completed]);
    }

    #[tokio::test]
    async fn concurrent_batch_is_rejected() {
        let (_, _, scheduler, _) = setup(&["a.jpg"], vec![]);

        let guard = scheduler.try_acquire().unwrap();
        assert_eq!(
            scheduler.run_batch(PromptSettings::default()).await,
            Err(SchedulerError::AlreadyRunning)
        );
        drop(guard);
        assert!(scheduler.try_acquire().is_ok());
    }

    #[tokio::test]
    async fn cancelled_run_processes_nothing_further() {
        let (store, generator, scheduler, _) = setup(&["a.jpg", "b.jpg"], vec![]);

        let guard = scheduler.try_acquire().unwrap();
        scheduler.cancel();
        let summary = scheduler.run(guard, PromptSettings::default()).await;

        assert!(summary.cancelled);
        assert_eq!(generator.calls(), 0);
        assert_eq!(statuses(&store), [WorkStatus::Pending, WorkStatus::Pending]);
    }

    #[tokio::test]
    async fn stale_guard_does_not_release_a_newer_run() {
        let (_, _, scheduler, _) = setup(&[], vec![]);

        let stale = scheduler.try_acquire().unwrap();
        scheduler.cancel();
        let fresh = scheduler.try_acquire().unwrap();
        drop(stale);

        assert!(scheduler.is_running());
        drop(fresh);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn removed_items_are_skipped() {
        let (store, generator, scheduler, ids) =
            setup(&["a.jpg", "b.jpg"], vec![Ok(png("b"))]);

        let guard = scheduler.try_acquire().unwrap();
        store.remove(ids[0]);
        let summary = scheduler.run(guard, PromptSettings::default()).await;

        assert_eq!(summary.attempted, 1);
        assert_eq!(generator.calls(), 1);
        assert_eq!(statuses(&store), [WorkStatus::Completed]);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_applies_after_each_processed_item() {
        let store = Arc::new(WorkItemStore::new());
        store.append(vec![
            WorkItem::new("a.jpg", SourceImage::new("image/jpeg", b"a".to_vec())),
            WorkItem::new("b.jpg", SourceImage::new("image/jpeg", b"b".to_vec())),
        ]);
        let generator = ScriptedGenerator::new(vec![Ok(png("a")), Ok(png("b"))]);
        let orchestrator = Arc::new(FallbackOrchestrator::new(
            generator,
            Arc::new(KeywordClassifier),
        ));
        let scheduler = BatchScheduler::new(store, orchestrator, Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        scheduler.run_batch(PromptSettings::default()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
