//! Incremental engine (spec §4.E): decides which scanned files need
//! re-parsing against a base snapshot, and carries forward the rest.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::model::Id;
use crate::scanner::ScannedFile;
use crate::snapshot_store::SnapshotStore;

#[derive(Debug, Clone, Default)]
pub struct IncrementalDiff {
    pub added: Vec<ScannedFile>,
    pub modified: Vec<ScannedFile>,
    pub deleted_paths: Vec<String>,
    pub unchanged_count: usize,
}

impl IncrementalDiff {
    pub fn total_changes(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted_paths.len()
    }

    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }
}

/// Loads `{path -> sha256}` for every file in a snapshot, as a single
/// batched read (spec §4.E step 2).
fn base_file_hashes(
    store: &dyn SnapshotStore,
    base_snapshot_id: &Id,
) -> Result<HashMap<String, Option<String>>> {
    let files = store.files(base_snapshot_id)?;
    Ok(files
        .into_iter()
        .map(|f| (f.path, f.sha256))
        .collect())
}

/// Computes the diff between `current_files` (a fresh scan) and an optional
/// base snapshot. With no base, every file is `added`.
pub fn compute_diff(
    store: &dyn SnapshotStore,
    current_files: Vec<ScannedFile>,
    base_snapshot_id: Option<&Id>,
) -> Result<IncrementalDiff> {
    let Some(base_snapshot_id) = base_snapshot_id else {
        return Ok(IncrementalDiff {
            added: current_files,
            modified: Vec::new(),
            deleted_paths: Vec::new(),
            unchanged_count: 0,
        });
    };

    let base_hashes = base_file_hashes(store, base_snapshot_id)?;
    let base_paths: HashSet<&String> = base_hashes.keys().collect();
    let current_paths: HashSet<&String> = current_files.iter().map(|f| &f.relpath).collect();

    let deleted_paths: Vec<String> = base_paths
        .difference(&current_paths)
        .map(|p| p.to_string())
        .collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut unchanged_count = 0;

    for file in current_files {
        match base_hashes.get(&file.relpath) {
            None => added.push(file),
            Some(base_sha) => {
                if *base_sha == file.sha256 {
                    unchanged_count += 1;
                } else {
                    modified.push(file);
                }
            }
        }
    }

    Ok(IncrementalDiff {
        added,
        modified,
        deleted_paths,
        unchanged_count,
    })
}

/// Copies File rows (and their Symbols/References) for `paths` from
/// `source_snapshot_id` into `target_snapshot_id` without re-parsing.
/// Preserves sha256, language, span counts and cached content.
pub fn carry_forward(
    store: &dyn SnapshotStore,
    source_snapshot_id: &Id,
    target_snapshot_id: &Id,
    paths: &HashSet<String>,
) -> Result<usize> {
    if paths.is_empty() {
        return Ok(0);
    }

    let source_files = store.files(source_snapshot_id)?;
    let source_symbols = store.symbols(source_snapshot_id)?;
    let source_references = store.references(source_snapshot_id)?;

    let mut copied = 0;
    let mut file_id_map: HashMap<Id, Id> = HashMap::new();
    let mut symbol_id_map: HashMap<Id, Id> = HashMap::new();

    for source_file in source_files.iter().filter(|f| paths.contains(&f.path)) {
        let scanned = ScannedFile {
            relpath: source_file.path.clone(),
            absolute_path: Default::default(),
            language: source_file.language,
            size_bytes: source_file.size_bytes,
            is_binary: source_file.is_binary,
            sha256: source_file.sha256.clone(),
            line_count: source_file.line_count,
            content: source_file.content.clone(),
        };
        let new_file_id = store.persist_file(target_snapshot_id, &scanned)?;
        copied += 1;
        file_id_map.insert(source_file.id.clone(), new_file_id.clone());

        for symbol in source_symbols
            .iter()
            .filter(|s| s.file_id == source_file.id)
        {
            let extracted = crate::parser::ExtractedSymbol {
                name: symbol.name.clone(),
                kind: match symbol.kind {
                    crate::model::SymbolKind::Module => crate::parser::ExtractedKind::Module,
                    crate::model::SymbolKind::Class => crate::parser::ExtractedKind::Class,
                    crate::model::SymbolKind::Method => crate::parser::ExtractedKind::Method,
                    _ => crate::parser::ExtractedKind::Function,
                },
                start_line: symbol.start_line,
                end_line: symbol.end_line,
                start_col: symbol.start_col,
                end_col: symbol.end_col,
                signature: symbol.signature.clone(),
                docstring: symbol.docstring.clone(),
                parent_name: None,
                span_approximate: symbol.span_approximate,
            };
            let parent_id = symbol
                .parent_id
                .as_ref()
                .and_then(|old_parent| symbol_id_map.get(old_parent).cloned());
            let new_symbol_id =
                store.persist_symbol(target_snapshot_id, &new_file_id, &extracted, parent_id)?;
            symbol_id_map.insert(symbol.id.clone(), new_symbol_id);
        }
    }

    for reference in source_references
        .iter()
        .filter(|r| symbol_id_map.contains_key(&r.from_symbol_id))
    {
        let target = match &reference.target {
            crate::model::ReferenceTarget::Symbol(id) => symbol_id_map
                .get(id)
                .cloned()
                .map(crate::model::ReferenceTarget::Symbol),
            crate::model::ReferenceTarget::File(id) => file_id_map
                .get(id)
                .cloned()
                .map(crate::model::ReferenceTarget::File),
        };
        if let Some(target) = target {
            let from = symbol_id_map[&reference.from_symbol_id].clone();
            store.persist_reference(
                target_snapshot_id,
                &from,
                target,
                reference.kind,
                reference.line,
                reference.column,
            )?;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::snapshot_store::InMemorySnapshotStore;

    fn scanned(relpath: &str, sha: &str) -> ScannedFile {
        ScannedFile {
            relpath: relpath.to_string(),
            absolute_path: Default::default(),
            language: Some(Language::Python),
            size_bytes: 5,
            is_binary: false,
            sha256: Some(sha.to_string()),
            line_count: 1,
            content: Some("pass\n".to_string()),
        }
    }

    #[test]
    fn no_base_snapshot_treats_everything_as_added() {
        let store = InMemorySnapshotStore::new();
        let diff = compute_diff(&store, vec![scanned("a.py", "h1")], None).unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.unchanged_count, 0);
    }

    #[test]
    fn unchanged_modified_added_deleted_classification() {
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let base = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();
        store.persist_file(&base.id, &scanned("same.py", "h1")).unwrap();
        store
            .persist_file(&base.id, &scanned("changed.py", "old_hash"))
            .unwrap();
        store.persist_file(&base.id, &scanned("gone.py", "h3")).unwrap();

        let current = vec![
            scanned("same.py", "h1"),
            scanned("changed.py", "new_hash"),
            scanned("new.py", "h4"),
        ];

        let diff = compute_diff(&store, current, Some(&base.id)).unwrap();
        assert_eq!(diff.unchanged_count, 1);
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].relpath, "changed.py");
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].relpath, "new.py");
        assert_eq!(diff.deleted_paths, vec!["gone.py".to_string()]);
    }

    #[test]
    fn carry_forward_copies_file_without_reparsing() {
        let store = InMemorySnapshotStore::new();
        let project = store.create_project("demo", None).unwrap();
        let source = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();
        store.persist_file(&source.id, &scanned("a.py", "h1")).unwrap();

        let target = store
            .create_snapshot(project.id.clone(), None, None)
            .unwrap();
        let mut paths = HashSet::new();
        paths.insert("a.py".to_string());
        let copied = carry_forward(&store, &source.id, &target.id, &paths).unwrap();
        assert_eq!(copied, 1);

        let target_files = store.files(&target.id).unwrap();
        assert_eq!(target_files.len(), 1);
        assert_eq!(target_files[0].sha256.as_deref(), Some("h1"));
    }
}
