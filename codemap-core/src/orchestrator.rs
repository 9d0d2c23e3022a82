//! Indexing orchestrator (spec §4.F): drives Scanner -> Parser -> Snapshot
//! store through the snapshot lifecycle.

use std::collections::HashMap;
use std::path::Path;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::incremental::{self, IncrementalDiff};
use crate::model::{Id, ReferenceKind, ReferenceTarget, SnapshotState};
use crate::parser::{self, ParseResult};
use crate::scanner::{self, ScanOptions, ScannedFile};
use crate::snapshot_store::{truncate_error, SnapshotStore};

pub const BATCH_SIZE: usize = 50;

/// Drives one full snapshot build for `project_id` rooted at `root`.
/// `base_snapshot_id` enables incremental carry-forward of unchanged files.
pub fn index_project(
    store: &dyn SnapshotStore,
    project_id: Id,
    root: &Path,
    commit_id: Option<String>,
    branch: Option<String>,
    base_snapshot_id: Option<&Id>,
) -> Result<Id> {
    if !root.exists() {
        return Err(CoreError::PathMissing {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(CoreError::PathNotDirectory {
            path: root.to_path_buf(),
        });
    }

    let snapshot = store.create_snapshot(project_id, commit_id, branch)?;
    let span = tracing::info_span!("index_project", snapshot_id = %snapshot.id);
    let _guard = span.enter();

    store.transition_snapshot(&snapshot.id, SnapshotState::Indexing, Some(5), None)?;
    info!("scanning files");

    let scan_result = scanner::scan(root, &ScanOptions::default());
    let scanned_files = match scan_result {
        Ok(files) => files,
        Err(err) => {
            let message = truncate_error(&err.to_string());
            store.transition_snapshot(
                &snapshot.id,
                SnapshotState::Failed,
                None,
                Some(message),
            )?;
            return Err(err);
        }
    };

    let total = scanned_files.len();
    store.transition_snapshot(&snapshot.id, SnapshotState::Indexing, Some(10), None)?;
    info!(total, "scan complete");

    let diff = match base_snapshot_id {
        Some(base_id) => incremental::compute_diff(store, scanned_files, Some(base_id))?,
        None => IncrementalDiff {
            added: scanned_files,
            modified: Vec::new(),
            deleted_paths: Vec::new(),
            unchanged_count: 0,
        },
    };

    let result = run_pipeline(store, &snapshot.id, base_snapshot_id, &diff);

    match result {
        Ok((file_count, symbol_count, total_lines)) => {
            store.finalize_snapshot_counts(&snapshot.id, file_count, symbol_count, total_lines)?;
            store.transition_snapshot(&snapshot.id, SnapshotState::Ready, Some(100), None)?;
            info!(file_count, symbol_count, total_lines, "indexing complete");
            Ok(snapshot.id)
        }
        Err(err) => {
            let message = truncate_error(&err.to_string());
            store.transition_snapshot(
                &snapshot.id,
                SnapshotState::Failed,
                None,
                Some(message),
            )?;
            Err(err)
        }
    }
}

fn run_pipeline(
    store: &dyn SnapshotStore,
    snapshot_id: &Id,
    base_snapshot_id: Option<&Id>,
    diff: &IncrementalDiff,
) -> Result<(usize, usize, usize)> {
    let mut file_count = 0;
    let mut symbol_count = 0;
    let mut total_lines = 0;
    let mut path_to_file_id: HashMap<String, Id> = HashMap::new();
    let mut pending_imports: Vec<PendingImport> = Vec::new();

    if let Some(base_id) = base_snapshot_id {
        if diff.unchanged_count > 0 {
            let unchanged_paths: std::collections::HashSet<String> = {
                let changed: std::collections::HashSet<&str> = diff
                    .added
                    .iter()
                    .chain(diff.modified.iter())
                    .map(|f| f.relpath.as_str())
                    .collect();
                let deleted: std::collections::HashSet<&str> =
                    diff.deleted_paths.iter().map(|s| s.as_str()).collect();
                store
                    .files(base_id)?
                    .into_iter()
                    .map(|f| f.path)
                    .filter(|p| !changed.contains(p.as_str()) && !deleted.contains(p.as_str()))
                    .collect()
            };
            let copied =
                incremental::carry_forward(store, base_id, snapshot_id, &unchanged_paths)?;
            file_count += copied;
        }
    }
    for record in store.files(snapshot_id)? {
        path_to_file_id.insert(record.path, record.id);
    }

    let to_process: Vec<&ScannedFile> = diff.added.iter().chain(diff.modified.iter()).collect();
    let n = to_process.len().max(1);

    // Parse in parallel (CPU-bound); persistence below stays sequential so
    // parent-name resolution can rely on scanner-determined order (spec §5).
    let parsed: Vec<(usize, ParseResult)> = to_process
        .par_iter()
        .enumerate()
        .map(|(i, file)| {
            let result = match (&file.content, file.language) {
                (Some(content), Some(language)) => {
                    parser::parse_file(language, content, &file.relpath)
                }
                _ => ParseResult::default(),
            };
            (i, result)
        })
        .collect();
    let mut parsed_by_index: HashMap<usize, ParseResult> = parsed.into_iter().collect();

    for (i, file) in to_process.iter().enumerate() {
        let progress = 10 + ((i as f64 / n as f64) * 80.0) as u8;
        store.transition_snapshot(snapshot_id, SnapshotState::Indexing, Some(progress), None)?;

        let file_id = store.persist_file(snapshot_id, file)?;
        path_to_file_id.insert(file.relpath.clone(), file_id.clone());
        file_count += 1;
        total_lines += file.line_count;

        if let Some(parse_result) = parsed_by_index.remove(&i) {
            if !parse_result.errors.is_empty() {
                warn!(path = %file.relpath, errors = ?parse_result.errors, "parser reported non-fatal errors");
            }

            let mut name_to_id: HashMap<String, Id> = HashMap::new();
            for extracted in &parse_result.symbols {
                let parent_id = extracted
                    .parent_name
                    .as_ref()
                    .and_then(|name| name_to_id.get(name).cloned());
                let symbol_id =
                    store.persist_symbol(snapshot_id, &file_id, extracted, parent_id)?;
                name_to_id.insert(extracted.name.clone(), symbol_id.clone());
                symbol_count += 1;
            }

            if !parse_result.imports.is_empty() {
                // Anchor file-level reference edges (imports have no more
                // specific originating symbol) on a synthetic module symbol.
                let module_symbol_id =
                    store.persist_module_symbol(snapshot_id, &file_id, &module_name(&file.relpath))?;
                symbol_count += 1;

                for import in &parse_result.imports {
                    pending_imports.push(PendingImport {
                        from_symbol_id: module_symbol_id.clone(),
                        from_path: file.relpath.clone(),
                        module: import.module.clone(),
                        is_relative: import.is_relative,
                        language: file.language,
                        line: import.line,
                    });
                }
            }
        }

        if (i + 1) % BATCH_SIZE == 0 {
            tracing::debug!(batch_end = i + 1, "batch commit boundary");
        }
    }

    for pending in &pending_imports {
        if let Some(target_path) = resolve_import_path(pending, &path_to_file_id) {
            if let Some(target_file_id) = path_to_file_id.get(&target_path) {
                store.persist_reference(
                    snapshot_id,
                    &pending.from_symbol_id,
                    ReferenceTarget::File(target_file_id.clone()),
                    ReferenceKind::Import,
                    pending.line,
                    0,
                )?;
            }
        }
    }

    Ok((file_count, symbol_count, total_lines))
}

fn module_name(relpath: &str) -> String {
    Path::new(relpath)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| relpath.to_string())
}

struct PendingImport {
    from_symbol_id: Id,
    from_path: String,
    module: String,
    is_relative: bool,
    language: Option<crate::language::Language>,
    line: usize,
}

/// Resolves an import to a path already present in this snapshot's file
/// table. Only relative/local imports are attempted; external package
/// imports have no corresponding File and are left unresolved.
fn resolve_import_path(
    pending: &PendingImport,
    path_to_file_id: &HashMap<String, Id>,
) -> Option<String> {
    use crate::language::Language;

    let dir = Path::new(&pending.from_path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let candidates: Vec<String> = match pending.language {
        Some(Language::Python) => {
            let module_path = pending.module.trim_start_matches('.').replace('.', "/");
            let base = if pending.is_relative && !dir.is_empty() {
                format!("{dir}/{module_path}")
            } else {
                module_path
            };
            vec![format!("{base}.py"), format!("{base}/__init__.py")]
        }
        Some(Language::Javascript) | Some(Language::Typescript) => {
            if !pending.module.starts_with('.') {
                return None;
            }
            let base = if dir.is_empty() {
                pending.module.trim_start_matches("./").to_string()
            } else {
                format!("{dir}/{}", pending.module.trim_start_matches("./"))
            };
            vec![
                format!("{base}.ts"),
                format!("{base}.tsx"),
                format!("{base}.js"),
                format!("{base}.jsx"),
                format!("{base}/index.ts"),
                format!("{base}/index.js"),
            ]
        }
        _ => return None,
    };

    candidates.into_iter().find(|c| path_to_file_id.contains_key(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_store::InMemorySnapshotStore;

    #[test]
    fn missing_root_fails_before_creating_snapshot() {
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let result = index_project(
            &store,
            project.id,
            Path::new("/does/not/exist"),
            None,
            None,
            None,
        );
        assert!(matches!(result, Err(CoreError::PathMissing { .. })));
    }

    #[test]
    fn indexes_python_project_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.py"),
            "class Greeter:\n    def greet(self):\n        pass\n",
        )
        .unwrap();

        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let snapshot_id = index_project(
            &store,
            project.id,
            dir.path(),
            None,
            None,
            None,
        )
        .unwrap();

        let snapshot = store.get_snapshot(&snapshot_id).unwrap().unwrap();
        assert_eq!(snapshot.state, SnapshotState::Ready);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.file_count, 1);
        assert_eq!(snapshot.symbol_count, 2);

        let symbols = store.symbols(&snapshot_id).unwrap();
        let method = symbols.iter().find(|s| s.name == "greet").unwrap();
        let class = symbols.iter().find(|s| s.name == "Greeter").unwrap();
        assert_eq!(method.parent_id.as_deref(), Some(class.id.as_str()));
    }

    #[test]
    fn empty_project_yields_ready_snapshot_with_zero_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let snapshot_id = index_project(&store, project.id, dir.path(), None, None, None).unwrap();

        let snapshot = store.get_snapshot(&snapshot_id).unwrap().unwrap();
        assert_eq!(snapshot.state, SnapshotState::Ready);
        assert_eq!(snapshot.file_count, 0);
        assert_eq!(snapshot.symbol_count, 0);
    }

    #[test]
    fn incremental_rebuild_carries_forward_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def a():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "def b():\n    pass\n").unwrap();

        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let base_id = index_project(&store, project.id.clone(), dir.path(), None, None, None)
            .unwrap();

        // Change only b.py.
        std::fs::write(dir.path().join("b.py"), "def b():\n    return 1\n").unwrap();

        let next_id = index_project(
            &store,
            project.id,
            dir.path(),
            None,
            None,
            Some(&base_id),
        )
        .unwrap();

        let snapshot = store.get_snapshot(&next_id).unwrap().unwrap();
        assert_eq!(snapshot.file_count, 2);
        assert_eq!(snapshot.symbol_count, 2);
    }
}
