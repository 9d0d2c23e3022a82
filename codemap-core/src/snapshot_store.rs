//! Snapshot store (spec §4.D, §6.6): persistence abstraction for Project,
//! Snapshot, File, Symbol, Reference, Changeset and Patch entities.
//!
//! Global invariants enforced:
//! - FAILED snapshots never pollute prior READY snapshots
//! - Byte-for-byte deterministic JSON serialization on disk

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::{
    Changeset, FileRecord, Id, Project, Reference, ReferenceKind, ReferenceTarget, Snapshot,
    SnapshotState, Symbol,
};
use crate::parser::{ExtractedImport, ExtractedSymbol};
use crate::scanner::ScannedFile;

/// Abstract persistence contract (spec §4.D). Implementations are free to
/// choose their storage medium as long as query semantics match.
pub trait SnapshotStore {
    fn create_project(&self, name: &str, root_path: Option<String>) -> Result<Project>;
    fn get_project(&self, id: &Id) -> Result<Option<Project>>;

    fn create_snapshot(
        &self,
        project_id: Id,
        commit_id: Option<String>,
        branch: Option<String>,
    ) -> Result<Snapshot>;
    fn transition_snapshot(
        &self,
        id: &Id,
        new_state: SnapshotState,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<()>;
    fn get_snapshot(&self, id: &Id) -> Result<Option<Snapshot>>;
    fn finalize_snapshot_counts(
        &self,
        id: &Id,
        file_count: usize,
        symbol_count: usize,
        total_lines: usize,
    ) -> Result<()>;

    fn persist_file(&self, snapshot_id: &Id, scanned: &ScannedFile) -> Result<Id>;
    fn persist_symbol(
        &self,
        snapshot_id: &Id,
        file_id: &Id,
        extracted: &ExtractedSymbol,
        parent_id: Option<Id>,
    ) -> Result<Id>;
    /// Persists a synthetic `module`-kind symbol that anchors file-level
    /// reference edges (e.g. imports) with no more specific originating
    /// symbol. Not derived from a `ParseResult`, since no language backend
    /// emits `module`-kind symbols directly.
    fn persist_module_symbol(&self, snapshot_id: &Id, file_id: &Id, name: &str) -> Result<Id>;
    fn persist_reference(
        &self,
        snapshot_id: &Id,
        from_symbol_id: &Id,
        target: ReferenceTarget,
        kind: ReferenceKind,
        line: usize,
        column: usize,
    ) -> Result<Id>;

    fn files(&self, snapshot_id: &Id) -> Result<Vec<FileRecord>>;
    fn symbols(&self, snapshot_id: &Id) -> Result<Vec<Symbol>>;
    fn references(&self, snapshot_id: &Id) -> Result<Vec<Reference>>;

    fn create_changeset(&self, changeset: Changeset) -> Result<()>;
    fn get_changeset(&self, id: &Id) -> Result<Option<Changeset>>;
    fn update_changeset(&self, changeset: &Changeset) -> Result<()>;
}

/// Everything the in-memory store holds for one snapshot.
#[derive(Debug, Clone, Default)]
struct SnapshotData {
    files: Vec<FileRecord>,
    symbols: Vec<Symbol>,
    references: Vec<Reference>,
}

#[derive(Default)]
struct StoreState {
    projects: HashMap<Id, Project>,
    snapshots: HashMap<Id, Snapshot>,
    snapshot_data: HashMap<Id, SnapshotData>,
    changesets: HashMap<Id, Changeset>,
}

/// Reference in-memory implementation. Suitable for CLI one-shot runs and
/// as the backing store `JsonSnapshotStore` checkpoints to disk.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    state: Mutex<StoreState>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned() -> CoreError {
    CoreError::persistence("snapshot store lock was poisoned")
}

impl SnapshotStore for InMemorySnapshotStore {
    fn create_project(&self, name: &str, root_path: Option<String>) -> Result<Project> {
        let mut project = Project::new(name);
        project.root_path = root_path;
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state.projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state.projects.get(id).cloned())
    }

    fn create_snapshot(
        &self,
        project_id: Id,
        commit_id: Option<String>,
        branch: Option<String>,
    ) -> Result<Snapshot> {
        let snapshot = Snapshot::new(project_id, commit_id, branch);
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state.snapshots.insert(snapshot.id.clone(), snapshot.clone());
        state
            .snapshot_data
            .insert(snapshot.id.clone(), SnapshotData::default());
        Ok(snapshot)
    }

    fn transition_snapshot(
        &self,
        id: &Id,
        new_state: SnapshotState,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let snapshot = state
            .snapshots
            .get_mut(id)
            .ok_or_else(|| CoreError::persistence(format!("unknown snapshot: {id}")))?;
        snapshot.state = new_state;
        if let Some(p) = progress {
            snapshot.progress = p;
        }
        if let Some(e) = error {
            snapshot.error_message = Some(truncate_error(&e));
        }
        if !snapshot.state_invariant_holds() {
            return Err(CoreError::persistence(format!(
                "state invariant violated transitioning snapshot {id} to {new_state:?}"
            )));
        }
        Ok(())
    }

    fn get_snapshot(&self, id: &Id) -> Result<Option<Snapshot>> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state.snapshots.get(id).cloned())
    }

    fn finalize_snapshot_counts(
        &self,
        id: &Id,
        file_count: usize,
        symbol_count: usize,
        total_lines: usize,
    ) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let snapshot = state
            .snapshots
            .get_mut(id)
            .ok_or_else(|| CoreError::persistence(format!("unknown snapshot: {id}")))?;
        snapshot.file_count = file_count;
        snapshot.symbol_count = symbol_count;
        snapshot.total_lines = total_lines;
        Ok(())
    }

    fn persist_file(&self, snapshot_id: &Id, scanned: &ScannedFile) -> Result<Id> {
        let id = crate::model::new_id();
        let content = if scanned.size_bytes < 100_000 {
            scanned.content.clone()
        } else {
            None
        };
        let record = FileRecord {
            id: id.clone(),
            snapshot_id: snapshot_id.clone(),
            path: scanned.relpath.clone(),
            language: scanned.language,
            size_bytes: scanned.size_bytes,
            line_count: scanned.line_count,
            sha256: scanned.sha256.clone(),
            is_binary: scanned.is_binary,
            content,
        };
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let data = state
            .snapshot_data
            .entry(snapshot_id.clone())
            .or_default();
        data.files.push(record);
        Ok(id)
    }

    fn persist_symbol(
        &self,
        snapshot_id: &Id,
        file_id: &Id,
        extracted: &ExtractedSymbol,
        parent_id: Option<Id>,
    ) -> Result<Id> {
        let id = crate::model::new_id();
        let symbol = Symbol {
            id: id.clone(),
            snapshot_id: snapshot_id.clone(),
            file_id: file_id.clone(),
            name: extracted.name.clone(),
            qualified_name: None,
            kind: extracted.kind.into(),
            start_line: extracted.start_line,
            end_line: extracted.end_line,
            start_col: extracted.start_col,
            end_col: extracted.end_col,
            signature: extracted.signature.clone(),
            docstring: extracted.docstring.clone(),
            parent_id,
            span_approximate: extracted.span_approximate,
        };
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let data = state
            .snapshot_data
            .entry(snapshot_id.clone())
            .or_default();
        data.symbols.push(symbol);
        Ok(id)
    }

    fn persist_module_symbol(&self, snapshot_id: &Id, file_id: &Id, name: &str) -> Result<Id> {
        let id = crate::model::new_id();
        let symbol = Symbol {
            id: id.clone(),
            snapshot_id: snapshot_id.clone(),
            file_id: file_id.clone(),
            name: name.to_string(),
            qualified_name: None,
            kind: crate::model::SymbolKind::Module,
            start_line: 1,
            end_line: 1,
            start_col: 0,
            end_col: 0,
            signature: None,
            docstring: None,
            parent_id: None,
            span_approximate: true,
        };
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let data = state
            .snapshot_data
            .entry(snapshot_id.clone())
            .or_default();
        data.symbols.push(symbol);
        Ok(id)
    }

    fn persist_reference(
        &self,
        snapshot_id: &Id,
        from_symbol_id: &Id,
        target: ReferenceTarget,
        kind: ReferenceKind,
        line: usize,
        column: usize,
    ) -> Result<Id> {
        let id = crate::model::new_id();
        let reference = Reference {
            id: id.clone(),
            snapshot_id: snapshot_id.clone(),
            from_symbol_id: from_symbol_id.clone(),
            target,
            kind,
            line,
            column,
        };
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        let data = state
            .snapshot_data
            .entry(snapshot_id.clone())
            .or_default();
        data.references.push(reference);
        Ok(id)
    }

    fn files(&self, snapshot_id: &Id) -> Result<Vec<FileRecord>> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state
            .snapshot_data
            .get(snapshot_id)
            .map(|d| d.files.clone())
            .unwrap_or_default())
    }

    fn symbols(&self, snapshot_id: &Id) -> Result<Vec<Symbol>> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state
            .snapshot_data
            .get(snapshot_id)
            .map(|d| d.symbols.clone())
            .unwrap_or_default())
    }

    fn references(&self, snapshot_id: &Id) -> Result<Vec<Reference>> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state
            .snapshot_data
            .get(snapshot_id)
            .map(|d| d.references.clone())
            .unwrap_or_default())
    }

    fn create_changeset(&self, changeset: Changeset) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state.changesets.insert(changeset.id.clone(), changeset);
        Ok(())
    }

    fn get_changeset(&self, id: &Id) -> Result<Option<Changeset>> {
        let state = self.state.lock().map_err(|_| lock_poisoned())?;
        Ok(state.changesets.get(id).cloned())
    }

    fn update_changeset(&self, changeset: &Changeset) -> Result<()> {
        if !changeset.state_invariant_holds() {
            return Err(CoreError::persistence(
                "changeset state invariant violated on update",
            ));
        }
        let mut state = self.state.lock().map_err(|_| lock_poisoned())?;
        state
            .changesets
            .insert(changeset.id.clone(), changeset.clone());
        Ok(())
    }
}

/// Truncates an error message to 1000 chars (spec §4.F step 5).
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= 1000 {
        message.to_string()
    } else {
        message.chars().take(1000).collect()
    }
}

/// On-disk schema-versioned envelope for one persisted snapshot (spec §6.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub schema_version: u32,
    pub snapshot: Snapshot,
    pub files: Vec<FileRecord>,
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
}

/// JSON-file-backed store. Layout: `<root>/.codemap/snapshots/<id>.json`,
/// `<root>/.codemap/index.json`. Builds on an `InMemorySnapshotStore` for
/// the live session and checkpoints finalized snapshots to disk.
pub struct JsonSnapshotStore {
    root: PathBuf,
    inner: InMemorySnapshotStore,
}

impl JsonSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonSnapshotStore {
            root: root.into(),
            inner: InMemorySnapshotStore::new(),
        }
    }

    pub fn codemap_dir(&self) -> PathBuf {
        self.root.join(".codemap")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.codemap_dir().join("snapshots")
    }

    pub fn snapshot_path(&self, snapshot_id: &Id) -> PathBuf {
        self.snapshots_dir().join(format!("{snapshot_id}.json"))
    }

    /// Writes a snapshot and its rows to disk atomically. Immutable: an
    /// existing file must be byte-identical or this call fails.
    pub fn checkpoint(&self, snapshot_id: &Id) -> Result<()> {
        let snapshot = self
            .inner
            .get_snapshot(snapshot_id)?
            .ok_or_else(|| CoreError::persistence(format!("unknown snapshot: {snapshot_id}")))?;
        let persisted = PersistedSnapshot {
            schema_version: crate::model::INDEX_SCHEMA_VERSION,
            snapshot,
            files: self.inner.files(snapshot_id)?,
            symbols: self.inner.symbols(snapshot_id)?,
            references: self.inner.references(snapshot_id)?,
        };
        let json = serde_json::to_string_pretty(&persisted)?;
        let path = self.snapshot_path(snapshot_id);

        if path.exists() {
            let existing = fs::read_to_string(&path)
                .map_err(|e| CoreError::persistence_with_source("reading existing snapshot", e))?;
            if existing == json {
                return Ok(());
            }
            return Err(CoreError::persistence(format!(
                "snapshot {snapshot_id} already persisted and differs; snapshots are immutable"
            )));
        }

        atomic_write(&path, &json)
    }

    pub fn load(&self, snapshot_id: &Id) -> Result<PersistedSnapshot> {
        let path = self.snapshot_path(snapshot_id);
        let json = fs::read_to_string(&path)
            .map_err(|e| CoreError::persistence_with_source(format!("reading {path:?}"), e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Loads a checkpointed snapshot from disk into the live in-memory
    /// state, so `files`/`symbols`/`references` (and therefore the
    /// incremental engine's carry-forward) see it even though it was built
    /// by an earlier process. A no-op on schema mismatch is not attempted:
    /// callers get the persistence error instead.
    pub fn hydrate(&self, snapshot_id: &Id) -> Result<()> {
        let persisted = self.load(snapshot_id)?;
        let mut state = self.inner.state.lock().map_err(|_| lock_poisoned())?;
        state
            .snapshots
            .insert(persisted.snapshot.id.clone(), persisted.snapshot.clone());
        state.snapshot_data.insert(
            persisted.snapshot.id,
            SnapshotData {
                files: persisted.files,
                symbols: persisted.symbols,
                references: persisted.references,
            },
        );
        Ok(())
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn create_project(&self, name: &str, root_path: Option<String>) -> Result<Project> {
        self.inner.create_project(name, root_path)
    }

    fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        self.inner.get_project(id)
    }

    fn create_snapshot(
        &self,
        project_id: Id,
        commit_id: Option<String>,
        branch: Option<String>,
    ) -> Result<Snapshot> {
        self.inner.create_snapshot(project_id, commit_id, branch)
    }

    fn transition_snapshot(
        &self,
        id: &Id,
        new_state: SnapshotState,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<()> {
        self.inner.transition_snapshot(id, new_state, progress, error)
    }

    fn get_snapshot(&self, id: &Id) -> Result<Option<Snapshot>> {
        self.inner.get_snapshot(id)
    }

    fn finalize_snapshot_counts(
        &self,
        id: &Id,
        file_count: usize,
        symbol_count: usize,
        total_lines: usize,
    ) -> Result<()> {
        self.inner
            .finalize_snapshot_counts(id, file_count, symbol_count, total_lines)
    }

    fn persist_file(&self, snapshot_id: &Id, scanned: &ScannedFile) -> Result<Id> {
        self.inner.persist_file(snapshot_id, scanned)
    }

    fn persist_symbol(
        &self,
        snapshot_id: &Id,
        file_id: &Id,
        extracted: &ExtractedSymbol,
        parent_id: Option<Id>,
    ) -> Result<Id> {
        self.inner
            .persist_symbol(snapshot_id, file_id, extracted, parent_id)
    }

    fn persist_module_symbol(&self, snapshot_id: &Id, file_id: &Id, name: &str) -> Result<Id> {
        self.inner.persist_module_symbol(snapshot_id, file_id, name)
    }

    fn persist_reference(
        &self,
        snapshot_id: &Id,
        from_symbol_id: &Id,
        target: ReferenceTarget,
        kind: ReferenceKind,
        line: usize,
        column: usize,
    ) -> Result<Id> {
        self.inner
            .persist_reference(snapshot_id, from_symbol_id, target, kind, line, column)
    }

    fn files(&self, snapshot_id: &Id) -> Result<Vec<FileRecord>> {
        self.inner.files(snapshot_id)
    }

    fn symbols(&self, snapshot_id: &Id) -> Result<Vec<Symbol>> {
        self.inner.symbols(snapshot_id)
    }

    fn references(&self, snapshot_id: &Id) -> Result<Vec<Reference>> {
        self.inner.references(snapshot_id)
    }

    fn create_changeset(&self, changeset: Changeset) -> Result<()> {
        self.inner.create_changeset(changeset)
    }

    fn get_changeset(&self, id: &Id) -> Result<Option<Changeset>> {
        self.inner.get_changeset(id)
    }

    fn update_changeset(&self, changeset: &Changeset) -> Result<()> {
        self.inner.update_changeset(changeset)
    }
}

/// Write `contents` to `path` via temp-file + fsync + rename (grounded on
/// the teacher's `snapshot.rs::atomic_write`).
fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CoreError::persistence_with_source("creating snapshot directory", e))?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path)
            .map_err(|e| CoreError::persistence_with_source("creating temp file", e))?;
        use std::io::Write;
        file.write_all(contents.as_bytes())
            .map_err(|e| CoreError::persistence_with_source("writing temp file", e))?;
        file.sync_all()
            .map_err(|e| CoreError::persistence_with_source("syncing temp file", e))?;
    }
    fs::rename(&temp_path, path)
        .map_err(|e| CoreError::persistence_with_source("renaming temp file", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ExtractedKind;

    fn sample_scanned_file() -> ScannedFile {
        ScannedFile {
            relpath: "a.py".to_string(),
            absolute_path: PathBuf::from("/tmp/a.py"),
            language: Some(crate::language::Language::Python),
            size_bytes: 10,
            is_binary: false,
            sha256: Some("deadbeef".to_string()),
            line_count: 1,
            content: Some("pass\n".to_string()),
        }
    }

    #[test]
    fn create_project_and_snapshot_lifecycle() {
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let snapshot = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();
        assert_eq!(snapshot.state, SnapshotState::Pending);

        store
            .transition_snapshot(&snapshot.id, SnapshotState::Indexing, Some(5), None)
            .unwrap();
        store
            .transition_snapshot(&snapshot.id, SnapshotState::Ready, Some(100), None)
            .unwrap();

        let reloaded = store.get_snapshot(&snapshot.id).unwrap().unwrap();
        assert_eq!(reloaded.state, SnapshotState::Ready);
        assert_eq!(reloaded.progress, 100);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let snapshot = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();
        let result =
            store.transition_snapshot(&snapshot.id, SnapshotState::Ready, Some(50), None);
        assert!(result.is_err());
    }

    #[test]
    fn persist_file_and_symbol_round_trips() {
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let snapshot = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();

        let file_id = store
            .persist_file(&snapshot.id, &sample_scanned_file())
            .unwrap();

        let extracted = ExtractedSymbol {
            name: "foo".to_string(),
            kind: ExtractedKind::Function,
            start_line: 1,
            end_line: 2,
            start_col: 0,
            end_col: 0,
            signature: Some("def foo()".to_string()),
            docstring: None,
            parent_name: None,
            span_approximate: false,
        };
        let symbol_id = store
            .persist_symbol(&snapshot.id, &file_id, &extracted, None)
            .unwrap();

        let symbols = store.symbols(&snapshot.id).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].id, symbol_id);
        assert_eq!(symbols[0].file_id, file_id);
    }

    #[test]
    fn large_file_content_is_not_cached_inline() {
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let snapshot = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();

        let mut big = sample_scanned_file();
        big.size_bytes = 200_000;
        big.content = Some("x".repeat(200_000));

        let file_id = store.persist_file(&snapshot.id, &big).unwrap();
        let files = store.files(&snapshot.id).unwrap();
        let record = files.iter().find(|f| f.id == file_id).unwrap();
        assert!(record.content.is_none());
    }

    #[test]
    fn truncate_error_caps_at_1000_chars() {
        let long = "e".repeat(2000);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), 1000);
    }

    #[test]
    fn json_store_checkpoint_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        let project = store.create_project("demo", None).unwrap();
        let snapshot = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();
        store
            .transition_snapshot(&snapshot.id, SnapshotState::Indexing, Some(5), None)
            .unwrap();
        store
            .transition_snapshot(&snapshot.id, SnapshotState::Ready, Some(100), None)
            .unwrap();

        store.checkpoint(&snapshot.id).unwrap();
        store.checkpoint(&snapshot.id).unwrap();

        let loaded = store.load(&snapshot.id).unwrap();
        assert_eq!(loaded.snapshot.id, snapshot.id);
    }

    #[test]
    fn json_store_rejects_divergent_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        let project = store.create_project("demo", None).unwrap();
        let snapshot = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();
        store.checkpoint(&snapshot.id).unwrap();

        store
            .transition_snapshot(&snapshot.id, SnapshotState::Indexing, Some(5), None)
            .unwrap();
        let result = store.checkpoint(&snapshot.id);
        assert!(result.is_err());
    }
}
