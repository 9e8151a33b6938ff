use serde_json::Value;
use tracing::{debug, info, warn};

use super::run_tracker::RunTracker;
use super::SyncError;
use crate::config::SyncDefaults;
use crate::graph::{HttpMethod, PagedFetcher};
use crate::inventory::{
    parse_assignment, GraphGroupDirectory, ItemKind, NormalizeError, Normalizer, RunRecord,
    SourceAssignment,
};
use crate::inventory_store::InventoryStore;

/// What one inventory run does besides storing the listed items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryOptions {
    /// Clear the collection before writing the fetched items.
    pub force: bool,
    /// Fetch each item's detail to get its script content.
    pub include_content: bool,
    /// Fetch and store each item's assignments.
    pub include_assignments: bool,
}

impl From<&SyncDefaults> for InventoryOptions {
    fn from(defaults: &SyncDefaults) -> Self {
        Self {
            force: false,
            include_content: defaults.include_content,
            include_assignments: defaults.include_assignments,
        }
    }
}

/// Drives inventory runs against one fetcher and one store.
pub struct SyncOrchestrator<'a> {
    fetcher: &'a PagedFetcher,
    store: &'a dyn InventoryStore,
    options: InventoryOptions,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        fetcher: &'a PagedFetcher,
        store: &'a dyn InventoryStore,
        options: InventoryOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            options,
        }
    }

    pub fn options(&self) -> InventoryOptions {
        self.options
    }

    /// Runs one inventory of `kind` and returns the closed run record.
    ///
    /// Item-level failures are counted on the run. Collection-level failures
    /// (fetching the list, authentication, store writes) close the run as
    /// `Failed` and are returned.
    pub fn run(&self, kind: ItemKind) -> Result<RunRecord, SyncError> {
        let mut tracker = RunTracker::start(self.store, kind)?;
        info!(
            "Starting {} inventory run {} (force: {}, content: {}, assignments: {})",
            kind,
            tracker.run_id(),
            self.options.force,
            self.options.include_content,
            self.options.include_assignments
        );

        match self.execute(kind, &mut tracker) {
            Ok(()) => Ok(tracker.complete()?),
            Err(e) => {
                tracker.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// Runs every kind in turn. Stops at the first failed run.
    pub fn run_all(&self) -> Result<Vec<RunRecord>, SyncError> {
        ItemKind::ALL.iter().map(|kind| self.run(*kind)).collect()
    }

    fn execute(&self, kind: ItemKind, tracker: &mut RunTracker<'_>) -> Result<(), SyncError> {
        let items = self.fetcher.fetch_all(kind.api_collection())?;
        if items.is_empty() {
            info!("No {} items returned, nothing to store", kind);
            return Ok(());
        }
        info!("Fetched {} {} item(s)", items.len(), kind);

        if self.options.force {
            let removed = self.store.clear_collection(kind)?;
            info!("Force re-inventory: cleared {} existing {} record(s)", removed, kind);
        }

        let directory = GraphGroupDirectory::new(self.fetcher);
        let mut normalizer = Normalizer::new(&directory);
        let run_id = tracker.run_id().to_string();

        for (index, raw) in items.iter().enumerate() {
            match self.process_item(kind, raw, &mut normalizer, &run_id) {
                Ok(id) => {
                    debug!("Stored {} {}", kind, id);
                    tracker.record_item();
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let message = format!("{} {}: {}", kind, item_label(raw, index), e);
                    warn!("{}", message);
                    tracker.record_error(message);
                }
            }
        }

        info!(
            "Processed {} of {} {} item(s), {} error(s), {} group(s) resolved",
            tracker.items_processed(),
            items.len(),
            kind,
            tracker.error_count(),
            normalizer.resolved_groups()
        );
        Ok(())
    }

    /// Stores one item and, if enabled, its assignments. Returns the item id.
    fn process_item(
        &self,
        kind: ItemKind,
        raw: &Value,
        normalizer: &mut Normalizer<'_>,
        run_id: &str,
    ) -> Result<String, SyncError> {
        let detail;
        let source = if self.options.include_content && kind.carries_content() {
            let id = raw_id(raw).ok_or(NormalizeError::MissingField("id"))?;
            detail = self.fetcher.fetch_one(&item_path(kind, id), HttpMethod::Get, None)?;
            &detail
        } else {
            raw
        };

        let record = normalizer.normalize(source, kind)?.with_run(run_id);
        let record = self.store.upsert(record)?;

        if self.options.include_assignments {
            let path = format!("{}/assignments", item_path(kind, &record.id));
            let parsed = self
                .fetcher
                .fetch_all(&path)?
                .iter()
                .map(|raw| parse_assignment(raw, kind, &record.id))
                .collect::<Result<Vec<SourceAssignment>, _>>()?;

            let assignments = normalizer
                .resolve_assignment_targets(parsed)
                .into_iter()
                .map(|mut assignment| {
                    assignment.run_id = Some(run_id.to_string());
                    assignment
                })
                .collect();
            self.store.replace_assignments(kind, &record.id, assignments)?;
        }

        Ok(record.id)
    }
}

fn raw_id(raw: &Value) -> Option<&str> {
    raw.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

fn item_path(kind: ItemKind, id: &str) -> String {
    format!("{}/{}", kind.api_collection(), urlencoding::encode(id))
}

/// Names an item in error messages: its id, or its 1-based position.
fn item_label(raw: &Value, index: usize) -> String {
    match raw_id(raw) {
        Some(id) => id.to_string(),
        None => format!("#{}", index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_label_falls_back_to_position() {
        assert_eq!(item_label(&json!({"id": "a1"}), 0), "a1");
        assert_eq!(item_label(&json!({"displayName": "No Id"}), 2), "#3");
        assert_eq!(item_label(&json!({"id": ""}), 4), "#5");
    }

    #[test]
    fn test_item_path_encodes_id() {
        assert_eq!(
            item_path(ItemKind::Script, "a b"),
            "deviceManagement/deviceManagementScripts/a%20b"
        );
    }

    #[test]
    fn test_options_from_defaults_never_force() {
        let options = InventoryOptions::from(&SyncDefaults {
            include_content: true,
            include_assignments: true,
        });
        assert!(!options.force);
        assert!(options.include_content);
        assert!(options.include_assignments);
    }
}
