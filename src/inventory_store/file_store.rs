use super::{
    CollectionSummary, InventoryStore, ItemFilter, StoreError, StoreMetadata, StoreResult,
    StoreSummary,
};
use crate::inventory::{
    AssignmentRecord, ContentEdit, ContentHistoryEntry, InventoryRecord, ItemKind, RunRecord,
    RunStatus,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

const FORMAT_VERSION: u32 = 1;
pub const REPORTS_DIR: &str = "reports";
pub const SOURCE_CODE_DIR: &str = "source-code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreFile {
    Metadata,
    Collection(ItemKind),
    Assignments,
    ContentHistory,
    Runs,
}

impl StoreFile {
    fn file_name(&self) -> &'static str {
        match self {
            StoreFile::Metadata => "metadata.json",
            StoreFile::Collection(ItemKind::Application) => "applications.json",
            StoreFile::Collection(ItemKind::Script) => "scripts.json",
            StoreFile::Collection(ItemKind::Remediation) => "remediations.json",
            StoreFile::Assignments => "assignments.json",
            StoreFile::ContentHistory => "content_history.json",
            StoreFile::Runs => "runs.json",
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

struct PendingWrite {
    file: StoreFile,
    bytes: Vec<u8>,
}

type Collection = BTreeMap<String, InventoryRecord>;

struct State {
    metadata: StoreMetadata,
    collections: BTreeMap<ItemKind, Collection>,
    assignments: Vec<AssignmentRecord>,
    history: Vec<ContentHistoryEntry>,
    runs: Vec<RunRecord>,
}

impl State {
    fn collection(&self, kind: ItemKind) -> Collection {
        self.collections.get(&kind).cloned().unwrap_or_default()
    }

    fn contains(&self, kind: ItemKind, id: &str) -> bool {
        self.collections
            .get(&kind)
            .is_some_and(|records| records.contains_key(id))
    }
}

/// Inventory store kept as one JSON file per collection under a root directory.
///
/// Everything is loaded in memory on open. Each mutation rewrites the files it
/// touches: the previous file is copied to `<file>.backup`, the new content is
/// written to a temporary file and renamed over it. If any file of a mutation
/// fails, the files already replaced are restored from their backups and the
/// in-memory state is left untouched.
///
/// There is no cross-process lock: only one process may use a root at a time.
pub struct FileInventoryStore {
    root: PathBuf,
    state: Mutex<State>,
}

impl FileInventoryStore {
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<FileInventoryStore> {
        let root = root.into();
        for dir in [root.clone(), root.join(REPORTS_DIR), root.join(SOURCE_CODE_DIR)] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }

        let mut collections = BTreeMap::new();
        for kind in ItemKind::ALL {
            let path = root.join(StoreFile::Collection(kind).file_name());
            let records: Vec<InventoryRecord> = read_json(&path)?.unwrap_or_default();
            collections.insert(
                kind,
                records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            );
        }

        let metadata_path = root.join(StoreFile::Metadata.file_name());
        let existing_metadata: Option<StoreMetadata> = read_json(&metadata_path)?;
        let is_new = existing_metadata.is_none();
        let metadata = existing_metadata.unwrap_or_else(|| {
            let now = Utc::now();
            StoreMetadata {
                format_version: FORMAT_VERSION,
                created_at: now,
                last_modified: now,
            }
        });
        if metadata.format_version > FORMAT_VERSION {
            warn!(
                "Store at {} has format version {}, newer than supported {}",
                root.display(),
                metadata.format_version,
                FORMAT_VERSION
            );
        }

        let state = State {
            metadata,
            collections,
            assignments: read_json(&root.join(StoreFile::Assignments.file_name()))?
                .unwrap_or_default(),
            history: read_json(&root.join(StoreFile::ContentHistory.file_name()))?
                .unwrap_or_default(),
            runs: read_json(&root.join(StoreFile::Runs.file_name()))?.unwrap_or_default(),
        };

        let store = FileInventoryStore {
            root,
            state: Mutex::new(state),
        };

        {
            let mut state = store.state.lock().unwrap();
            if is_new {
                store.commit(&mut state, Vec::new())?;
                info!("Initialized inventory store at {}", store.root.display());
            } else {
                let total: usize = state.collections.values().map(|c| c.len()).sum();
                info!(
                    "Opened inventory store at {} ({} records, {} runs)",
                    store.root.display(),
                    total,
                    state.runs.len()
                );
            }
        }

        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join(REPORTS_DIR)
    }

    pub fn source_code_dir(&self) -> PathBuf {
        self.root.join(SOURCE_CODE_DIR)
    }

    fn path_of(&self, file: StoreFile) -> PathBuf {
        self.root.join(file.file_name())
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        file: StoreFile,
        value: &T,
    ) -> StoreResult<PendingWrite> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: self.path_of(file),
            source,
        })?;
        Ok(PendingWrite { file, bytes })
    }

    fn encode_collection(&self, kind: ItemKind, records: &Collection) -> StoreResult<PendingWrite> {
        let records: Vec<&InventoryRecord> = records.values().collect();
        self.encode(StoreFile::Collection(kind), &records)
    }

    /// Replaces every file in `writes` plus `metadata.json`, or none of them.
    /// Callers apply their in-memory change only after this returns `Ok`.
    fn commit(&self, state: &mut State, mut writes: Vec<PendingWrite>) -> StoreResult<()> {
        let metadata = StoreMetadata {
            last_modified: Utc::now(),
            ..state.metadata.clone()
        };
        writes.push(self.encode(StoreFile::Metadata, &metadata)?);

        let mut replaced: Vec<(StoreFile, bool)> = Vec::with_capacity(writes.len());
        for write in &writes {
            let path = self.path_of(write.file);
            let had_previous = path.exists();
            if let Err(e) = self.replace_file(&path, had_previous, &write.bytes) {
                warn!("{}; rolling back {} file(s)", e, replaced.len());
                self.roll_back(&replaced);
                return Err(e);
            }
            replaced.push((write.file, had_previous));
        }

        state.metadata = metadata;
        Ok(())
    }

    fn replace_file(&self, path: &Path, had_previous: bool, bytes: &[u8]) -> StoreResult<()> {
        let write_error = |source: std::io::Error| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        if had_previous {
            fs::copy(path, backup_path(path)).map_err(write_error)?;
        }

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(write_error)?;
        tmp.write_all(bytes).map_err(write_error)?;
        tmp.as_file().sync_all().map_err(write_error)?;
        tmp.persist(path).map_err(|e| write_error(e.error))?;
        Ok(())
    }

    fn roll_back(&self, replaced: &[(StoreFile, bool)]) {
        for (file, had_previous) in replaced.iter().rev() {
            let path = self.path_of(*file);
            let result = if *had_previous {
                fs::copy(backup_path(&path), &path).map(|_| ())
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = result {
                error!("Failed to restore {}: {}", path.display(), e);
            }
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl InventoryStore for FileInventoryStore {
    fn upsert(&self, mut record: InventoryRecord) -> StoreResult<InventoryRecord> {
        let mut state = self.state.lock().unwrap();
        let kind = record.kind;
        record.last_updated = Some(Utc::now());

        let mut records = state.collection(kind);
        records.insert(record.id.clone(), record.clone());
        let write = self.encode_collection(kind, &records)?;
        self.commit(&mut state, vec![write])?;
        state.collections.insert(kind, records);

        debug!("Upserted {} {}", kind, record.id);
        Ok(record)
    }

    fn get(&self, kind: ItemKind, id: &str) -> StoreResult<InventoryRecord> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(&kind)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    fn list(&self, kind: ItemKind, filter: &ItemFilter) -> StoreResult<Vec<InventoryRecord>> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<InventoryRecord> = state
            .collections
            .get(&kind)
            .map(|records| {
                records
                    .values()
                    .filter(|r| filter.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    fn delete(&self, kind: ItemKind, id: &str) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let mut records = state.collection(kind);
        if records.remove(id).is_none() {
            return Err(StoreError::NotFound {
                kind,
                id: id.to_string(),
            });
        }

        let belongs =
            |object_type: ItemKind, object_id: &str| object_type == kind && object_id == id;
        let assignments: Vec<AssignmentRecord> = state
            .assignments
            .iter()
            .filter(|a| !belongs(a.object_type, a.object_id.as_str()))
            .cloned()
            .collect();
        let history: Vec<ContentHistoryEntry> = state
            .history
            .iter()
            .filter(|h| !belongs(h.item_type, h.item_id.as_str()))
            .cloned()
            .collect();
        let removed_assignments = state.assignments.len() - assignments.len();
        let removed_history = state.history.len() - history.len();

        let writes = vec![
            self.encode_collection(kind, &records)?,
            self.encode(StoreFile::Assignments, &assignments)?,
            self.encode(StoreFile::ContentHistory, &history)?,
        ];
        self.commit(&mut state, writes)?;
        state.collections.insert(kind, records);
        state.assignments = assignments;
        state.history = history;

        info!(
            "Deleted {} {} with {} assignment(s) and {} history entries",
            kind, id, removed_assignments, removed_history
        );
        Ok(())
    }

    fn clear_collection(&self, kind: ItemKind) -> StoreResult<usize> {
        let mut state = self.state.lock().unwrap();
        let removed = state.collections.get(&kind).map_or(0, |r| r.len());

        let records = Collection::new();
        let write = self.encode_collection(kind, &records)?;
        self.commit(&mut state, vec![write])?;
        state.collections.insert(kind, records);

        info!("Cleared {} {} record(s)", removed, kind);
        Ok(removed)
    }

    fn add_content(
        &self,
        kind: ItemKind,
        id: &str,
        edit: ContentEdit,
    ) -> StoreResult<ContentHistoryEntry> {
        let mut state = self.state.lock().unwrap();
        let mut records = state.collection(kind);
        let Some(record) = records.get_mut(id) else {
            return Err(StoreError::NotFound {
                kind,
                id: id.to_string(),
            });
        };

        let previous_versions = state
            .history
            .iter()
            .filter(|h| h.item_type == kind && h.item_id == id)
            .count();
        let now = Utc::now();
        let entry = ContentHistoryEntry {
            item_id: id.to_string(),
            item_type: kind,
            content: edit.content.clone(),
            added_by: edit.added_by,
            added_at: now,
            comment: edit.comment,
            version: edit
                .version
                .unwrap_or_else(|| (previous_versions + 1).to_string()),
        };

        record.content = Some(edit.content);
        record.has_content = true;
        record.last_updated = Some(now);

        let mut history = state.history.clone();
        history.push(entry.clone());

        let writes = vec![
            self.encode_collection(kind, &records)?,
            self.encode(StoreFile::ContentHistory, &history)?,
        ];
        self.commit(&mut state, writes)?;
        state.collections.insert(kind, records);
        state.history = history;

        info!(
            "Added content version {} to {} {} by {}",
            entry.version, kind, id, entry.added_by
        );
        Ok(entry)
    }

    fn content_history(&self, kind: ItemKind, id: &str) -> StoreResult<Vec<ContentHistoryEntry>> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<ContentHistoryEntry> = state
            .history
            .iter()
            .rev()
            .filter(|h| h.item_type == kind && h.item_id == id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(entries)
    }

    fn upsert_assignment(&self, assignment: AssignmentRecord) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.contains(assignment.object_type, &assignment.object_id) {
            return Err(StoreError::NotFound {
                kind: assignment.object_type,
                id: assignment.object_id,
            });
        }

        let mut assignments = state.assignments.clone();
        let existing = assignments.iter().position(|a| {
            a.object_type == assignment.object_type
                && a.object_id == assignment.object_id
                && a.id == assignment.id
        });
        match existing {
            Some(index) => assignments[index] = assignment,
            None => assignments.push(assignment),
        }

        let write = self.encode(StoreFile::Assignments, &assignments)?;
        self.commit(&mut state, vec![write])?;
        state.assignments = assignments;
        Ok(())
    }

    fn replace_assignments(
        &self,
        kind: ItemKind,
        object_id: &str,
        assignments: Vec<AssignmentRecord>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.contains(kind, object_id) {
            return Err(StoreError::NotFound {
                kind,
                id: object_id.to_string(),
            });
        }

        let mut replaced: Vec<AssignmentRecord> = state
            .assignments
            .iter()
            .filter(|a| !(a.object_type == kind && a.object_id == object_id))
            .cloned()
            .collect();
        let removed = state.assignments.len() - replaced.len();
        let added = assignments.len();
        replaced.extend(assignments.into_iter().map(|mut a| {
            a.object_type = kind;
            a.object_id = object_id.to_string();
            a
        }));

        let write = self.encode(StoreFile::Assignments, &replaced)?;
        self.commit(&mut state, vec![write])?;
        state.assignments = replaced;

        debug!(
            "Replaced {} assignment(s) of {} {} with {}",
            removed, kind, object_id, added
        );
        Ok(())
    }

    fn list_assignments(
        &self,
        kind: ItemKind,
        object_id: &str,
    ) -> StoreResult<Vec<AssignmentRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.object_type == kind && a.object_id == object_id)
            .cloned()
            .collect())
    }

    fn create_run(&self, run: &RunRecord) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let mut runs = state.runs.clone();
        runs.retain(|r| r.id != run.id);
        runs.push(run.clone());

        let write = self.encode(StoreFile::Runs, &runs)?;
        self.commit(&mut state, vec![write])?;
        state.runs = runs;
        Ok(())
    }

    fn finish_run(&self, run: &RunRecord) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .runs
            .iter()
            .position(|r| r.id == run.id)
            .ok_or_else(|| StoreError::RunNotFound(run.id.clone()))?;
        if state.runs[index].status.is_terminal() {
            return Err(StoreError::RunAlreadyClosed(run.id.clone()));
        }

        let mut runs = state.runs.clone();
        runs[index] = run.clone();
        let write = self.encode(StoreFile::Runs, &runs)?;
        self.commit(&mut state, vec![write])?;
        state.runs = runs;
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> StoreResult<Option<RunRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state.runs.iter().find(|r| r.id == run_id).cloned())
    }

    fn list_runs(&self, kind: Option<ItemKind>, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let state = self.state.lock().unwrap();
        let mut runs: Vec<RunRecord> = state
            .runs
            .iter()
            .rev()
            .filter(|r| kind.map_or(true, |k| r.run_type == k))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn mark_stale_runs_failed(&self) -> StoreResult<usize> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let mut runs = state.runs.clone();
        let mut marked = 0;
        for run in runs.iter_mut().filter(|r| r.status == RunStatus::Running) {
            run.status = RunStatus::Failed;
            run.ended_at = Some(now);
            run.error_count += 1;
            run.error_messages
                .push("Run did not finish and was marked failed during recovery".to_string());
            marked += 1;
        }
        if marked == 0 {
            return Ok(0);
        }

        let write = self.encode(StoreFile::Runs, &runs)?;
        self.commit(&mut state, vec![write])?;
        state.runs = runs;

        warn!("Marked {} stale run(s) as failed", marked);
        Ok(marked)
    }

    fn summary(&self) -> StoreResult<StoreSummary> {
        let state = self.state.lock().unwrap();

        let mut collections = BTreeMap::new();
        for kind in ItemKind::ALL {
            let records = state.collections.get(&kind);
            collections.insert(
                kind,
                CollectionSummary {
                    records: records.map_or(0, |r| r.len()),
                    with_content: records
                        .map_or(0, |r| r.values().filter(|r| r.has_content).count()),
                    ..Default::default()
                },
            );
        }

        let live: HashSet<(ItemKind, &str)> = state
            .collections
            .iter()
            .flat_map(|(kind, records)| records.keys().map(move |id| (*kind, id.as_str())))
            .collect();

        let mut orphaned_assignments = 0;
        for assignment in &state.assignments {
            if live.contains(&(assignment.object_type, assignment.object_id.as_str())) {
                if let Some(summary) = collections.get_mut(&assignment.object_type) {
                    summary.assignments += 1;
                }
            } else {
                orphaned_assignments += 1;
            }
        }

        let mut orphaned_history_entries = 0;
        for entry in &state.history {
            if live.contains(&(entry.item_type, entry.item_id.as_str())) {
                if let Some(summary) = collections.get_mut(&entry.item_type) {
                    summary.history_entries += 1;
                }
            } else {
                orphaned_history_entries += 1;
            }
        }

        Ok(StoreSummary {
            collections,
            orphaned_assignments,
            orphaned_history_entries,
            runs: state.runs.len(),
            last_run: state.runs.iter().max_by_key(|r| r.started_at).cloned(),
        })
    }

    fn metadata(&self) -> StoreResult<StoreMetadata> {
        Ok(self.state.lock().unwrap().metadata.clone())
    }
}
