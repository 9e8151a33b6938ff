//! Run audit bookkeeping.
//!
//! Holds the in-flight run record and writes it to the store at the start and
//! at the end of an inventory run.

use std::time::Instant;

use chrono::Utc;
use tracing::{error, info};

use crate::inventory::{ItemKind, RunRecord, RunStatus};
use crate::inventory_store::{InventoryStore, StoreResult};

pub struct RunTracker<'a> {
    store: &'a dyn InventoryStore,
    run: RunRecord,
    start_time: Instant,
}

impl<'a> RunTracker<'a> {
    /// Creates a `Running` record and persists it right away.
    pub fn start(store: &'a dyn InventoryStore, kind: ItemKind) -> StoreResult<Self> {
        let run = RunRecord::start(kind);
        store.create_run(&run)?;
        Ok(Self {
            store,
            run,
            start_time: Instant::now(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    pub fn record_item(&mut self) {
        self.run.items_processed += 1;
    }

    pub fn record_error(&mut self, message: String) {
        self.run.error_count += 1;
        self.run.error_messages.push(message);
    }

    pub fn items_processed(&self) -> usize {
        self.run.items_processed
    }

    pub fn error_count(&self) -> usize {
        self.run.error_count
    }

    /// Closes the run as `Completed`, or `CompletedWithErrors` if any item failed.
    pub fn complete(mut self) -> StoreResult<RunRecord> {
        self.run.status = if self.run.error_count == 0 {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        self.run.ended_at = Some(Utc::now());
        self.store.finish_run(&self.run)?;

        info!(
            "{} run {} {} in {}ms: {} processed, {} errors",
            self.run.run_type,
            self.run.id,
            self.run.status.as_str(),
            self.elapsed_ms(),
            self.run.items_processed,
            self.run.error_count
        );
        Ok(self.run)
    }

    /// Closes the run as `Failed`, keeping the counts gathered so far.
    ///
    /// A store failure here is logged only: the caller is already handling
    /// the error that failed the run.
    pub fn fail(mut self, reason: &str) -> RunRecord {
        self.run.status = RunStatus::Failed;
        self.run.ended_at = Some(Utc::now());
        self.record_error(reason.to_string());

        if let Err(e) = self.store.finish_run(&self.run) {
            error!("Failed to record failure of run {}: {}", self.run.id, e);
        }
        error!(
            "{} run {} failed after {}ms: {}",
            self.run.run_type,
            self.run.id,
            self.elapsed_ms(),
            reason
        );
        self.run
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory_store::FileInventoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_start_persists_running_record() {
        let dir = TempDir::new().unwrap();
        let store = FileInventoryStore::open(dir.path()).unwrap();

        let tracker = RunTracker::start(&store, ItemKind::Script).unwrap();

        let stored = store.get_run(tracker.run_id()).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert!(stored.ended_at.is_none());
    }

    #[test]
    fn test_complete_with_errors() {
        let dir = TempDir::new().unwrap();
        let store = FileInventoryStore::open(dir.path()).unwrap();

        let mut tracker = RunTracker::start(&store, ItemKind::Application).unwrap();
        tracker.record_item();
        tracker.record_item();
        tracker.record_error("Application #3: missing id".to_string());
        let run = tracker.complete().unwrap();

        assert_eq!(run.status, RunStatus::CompletedWithErrors);
        assert_eq!(run.items_processed, 2);
        assert_eq!(run.error_count, 1);
        assert_eq!(store.get_run(&run.id).unwrap().unwrap(), run);
    }

    #[test]
    fn test_fail_keeps_partial_counts() {
        let dir = TempDir::new().unwrap();
        let store = FileInventoryStore::open(dir.path()).unwrap();

        let mut tracker = RunTracker::start(&store, ItemKind::Remediation).unwrap();
        tracker.record_item();
        let run = tracker.fail("token expired");

        let stored = store.get_run(&run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.items_processed, 1);
        assert_eq!(stored.error_messages, vec!["token expired".to_string()]);
        assert!(stored.ended_at.is_some());
    }
}
