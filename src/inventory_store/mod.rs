mod file_store;

pub use file_store::FileInventoryStore;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inventory::{
    AssignmentRecord, ContentEdit, ContentHistoryEntry, InventoryRecord, ItemKind, RunRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ItemKind, id: String },

    #[error("Run {0} not found")]
    RunNotFound(String),

    #[error("Run {0} is already closed")]
    RunAlreadyClosed(String),

    /// A file could not be replaced. Previously committed files were restored.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt store file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. } | StoreError::RunNotFound(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Optional predicates for `InventoryStore::list`. All set predicates must match.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Case-insensitive substring of the display name.
    pub name_contains: Option<String>,
    pub has_content: Option<bool>,
    pub run_id: Option<String>,
}

impl ItemFilter {
    pub fn matches(&self, record: &InventoryRecord) -> bool {
        if let Some(needle) = &self.name_contains {
            if !record
                .display_name
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(has_content) = self.has_content {
            if record.has_content != has_content {
                return false;
            }
        }
        if let Some(run_id) = &self.run_id {
            if record.run_id.as_deref() != Some(run_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub records: usize,
    pub with_content: usize,
    pub assignments: usize,
    pub history_entries: usize,
}

/// Aggregate counts over the whole store.
///
/// Orphans are assignment and history rows whose record is gone, which
/// happens after `clear_collection` until the next inventory restores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub collections: BTreeMap<ItemKind, CollectionSummary>,
    pub orphaned_assignments: usize,
    pub orphaned_history_entries: usize,
    pub runs: usize,
    pub last_run: Option<RunRecord>,
}

impl StoreSummary {
    pub fn total_records(&self) -> usize {
        self.collections.values().map(|c| c.records).sum()
    }
}

pub trait InventoryStore: Send + Sync {
    // Records
    /// Inserts or replaces by `(kind, id)` and returns the stored copy.
    fn upsert(&self, record: InventoryRecord) -> StoreResult<InventoryRecord>;
    fn get(&self, kind: ItemKind, id: &str) -> StoreResult<InventoryRecord>;
    /// Ordered by display name, then id.
    fn list(&self, kind: ItemKind, filter: &ItemFilter) -> StoreResult<Vec<InventoryRecord>>;
    /// Removes the record together with its assignments and content history.
    fn delete(&self, kind: ItemKind, id: &str) -> StoreResult<()>;
    /// Removes every record of `kind`, leaving assignments and history in place.
    /// Returns the number of records removed.
    fn clear_collection(&self, kind: ItemKind) -> StoreResult<usize>;

    // Content
    /// Appends a history entry and updates the record's content as one unit.
    fn add_content(
        &self,
        kind: ItemKind,
        id: &str,
        edit: ContentEdit,
    ) -> StoreResult<ContentHistoryEntry>;
    /// Newest first.
    fn content_history(&self, kind: ItemKind, id: &str) -> StoreResult<Vec<ContentHistoryEntry>>;

    // Assignments
    fn upsert_assignment(&self, assignment: AssignmentRecord) -> StoreResult<()>;
    /// Swaps every assignment of one record for `assignments` in one commit.
    /// `NotFound` if the record is absent.
    fn replace_assignments(
        &self,
        kind: ItemKind,
        object_id: &str,
        assignments: Vec<AssignmentRecord>,
    ) -> StoreResult<()>;
    fn list_assignments(
        &self,
        kind: ItemKind,
        object_id: &str,
    ) -> StoreResult<Vec<AssignmentRecord>>;

    // Runs
    fn create_run(&self, run: &RunRecord) -> StoreResult<()>;
    /// Stores the final state of a run. A run can be closed once.
    fn finish_run(&self, run: &RunRecord) -> StoreResult<()>;
    fn get_run(&self, run_id: &str) -> StoreResult<Option<RunRecord>>;
    /// Newest first.
    fn list_runs(&self, kind: Option<ItemKind>, limit: usize) -> StoreResult<Vec<RunRecord>>;
    /// Marks runs left `Running` by a dead process as failed. Returns how many.
    fn mark_stale_runs_failed(&self) -> StoreResult<usize>;

    fn summary(&self) -> StoreResult<StoreSummary>;
    fn metadata(&self) -> StoreResult<StoreMetadata>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_all_predicates() {
        let record = InventoryRecord::new(ItemKind::Script, "s1", "Set Wallpaper")
            .with_content("Write-Host")
            .with_run("run-1");

        assert!(ItemFilter::default().matches(&record));
        assert!(ItemFilter {
            name_contains: Some("wallPAPER".to_string()),
            has_content: Some(true),
            run_id: Some("run-1".to_string()),
        }
        .matches(&record));
        assert!(!ItemFilter {
            has_content: Some(false),
            ..Default::default()
        }
        .matches(&record));
        assert!(!ItemFilter {
            run_id: Some("run-2".to_string()),
            ..Default::default()
        }
        .matches(&record));
    }
}
