use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::item::{AttemptOutcome, SourceImage, WorkItem, WorkStatus};

/// In-memory collection of work items in upload order plus the export
/// selection.
///
/// Status changes go through [`WorkItemStore::begin_attempt`] and
/// [`WorkItemStore::finish_attempt`] only. Both keep the result/status and
/// selection invariants: an item has a result iff it is `Completed` or
/// `Fallback`, and only such items may be selected.
#[derive(Default)]
pub struct WorkItemStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    items: Vec<WorkItem>,
    selected: HashSet<Uuid>,
}

/// Which items an attempt may start on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPolicy {
    /// Batch runs: skip items that already succeeded.
    SkipSucceeded,
    /// User-triggered regeneration: any item not currently processing.
    Regenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BeginError {
    #[error("item not found")]
    NotFound,
    #[error("item is already being processed")]
    Busy,
    #[error("item already has a result")]
    AlreadySucceeded,
}

impl Inner {
    fn find_mut(&mut self, id: Uuid) -> Option<&mut WorkItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }
}

impl WorkItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append items, ordered by path within this upload. Duplicates are kept
    /// as distinct items.
    pub fn append(&self, mut items: Vec<WorkItem>) -> Vec<WorkItem> {
        items.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let mut inner = self.inner.write();
        inner.items.extend(items.iter().cloned());
        items
    }

    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.inner.read().items.clone()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.inner.read().items.iter().map(|item| item.id).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<WorkItem> {
        self.inner.read().items.iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_with_status(&self, status: WorkStatus) -> usize {
        self.inner
            .read()
            .items
            .iter()
            .filter(|item| item.status == status)
            .count()
    }

    /// Remove one item and evict it from the selection. Returns the removed item.
    pub fn remove(&self, id: Uuid) -> Option<WorkItem> {
        let mut inner = self.inner.write();
        inner.selected.remove(&id);
        let index = inner.items.iter().position(|item| item.id == id)?;
        Some(inner.items.remove(index))
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.items.clear();
        inner.selected.clear();
    }

    /// Move an item to `Processing`, clearing any previous result and
    /// selection. Returns the source image to generate from.
    pub fn begin_attempt(&self, id: Uuid, policy: AttemptPolicy) -> Result<SourceImage, BeginError> {
        let mut inner = self.inner.write();
        let item = inner.find_mut(id).ok_or(BeginError::NotFound)?;

        match item.status {
            WorkStatus::Processing => return Err(BeginError::Busy),
            status if status.is_success() && policy == AttemptPolicy::SkipSucceeded => {
                return Err(BeginError::AlreadySucceeded);
            }
            _ => {}
        }

        item.status = WorkStatus::Processing;
        item.result = None;
        item.error_message = None;
        item.updated_at = Utc::now();
        let source = item.source.clone();
        inner.selected.remove(&id);
        Ok(source)
    }

    /// Record a terminal outcome. Returns the updated item, or `None` when the
    /// item was removed while its request was in flight.
    pub fn finish_attempt(&self, id: Uuid, outcome: AttemptOutcome) -> Option<WorkItem> {
        let mut inner = self.inner.write();
        let item = inner.find_mut(id)?;

        item.status = outcome.status();
        match outcome {
            AttemptOutcome::Completed(result) | AttemptOutcome::Fallback(result) => {
                item.result = Some(result);
                item.error_message = None;
            }
            AttemptOutcome::Failed(message) => {
                item.result = None;
                item.error_message = Some(message);
            }
        }
        item.updated_at = Utc::now();
        Some(item.clone())
    }

    pub fn is_selected(&self, id: Uuid) -> bool {
        self.inner.read().selected.contains(&id)
    }

    /// Selected ids in store order.
    pub fn selected_ids(&self) -> Vec<Uuid> {
        let inner = self.inner.read();
        inner
            .items
            .iter()
            .filter(|item| inner.selected.contains(&item.id))
            .map(|item| item.id)
            .collect()
    }

    /// Selected items in store order.
    pub fn selected_items(&self) -> Vec<WorkItem> {
        let inner = self.inner.read();
        inner
            .items
            .iter()
            .filter(|item| inner.selected.contains(&item.id))
            .cloned()
            .collect()
    }

    /// Flip selection of one item. Items without a result cannot be selected;
    /// toggling them is a no-op. Returns the new membership.
    pub fn toggle_selection(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write();
        if inner.selected.remove(&id) {
            return false;
        }
        let selectable = inner
            .items
            .iter()
            .any(|item| item.id == id && item.has_result());
        if selectable {
            inner.selected.insert(id);
        }
        selectable
    }

    /// Select every item with a result, or clear the selection when all of
    /// them are already selected.
    pub fn select_all_completed(&self) -> Vec<Uuid> {
        let mut inner = self.inner.write();
        let done: HashSet<Uuid> = inner
            .items
            .iter()
            .filter(|item| item.has_result())
            .map(|item| item.id)
            .collect();

        if !done.is_empty() && inner.selected == done {
            inner.selected.clear();
        } else {
            inner.selected = done;
        }
        drop(inner);
        self.selected_ids()
    }
}
