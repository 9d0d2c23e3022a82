//! Changeset applier (spec §4.I): Create/Apply/Rollback/Commit/Delete over a
//! proposed set of file patches, with optimistic concurrency on Apply.

use std::fs;
use std::path::Path;

use chrono::Utc;
use similar::TextDiff;

use crate::error::{CoreError, Result};
use crate::model::{Changeset, ChangesetStatus, Id, Patch, new_id};
use crate::vcs::VcsCollaborator;

pub struct NewPatch {
    pub file_path: String,
    pub new_content: String,
}

/// Creates a `PROPOSED` changeset. Reads current content of each patch's
/// file (or `None` if absent) as `original_content` and computes its
/// unified diff.
pub fn create(
    root: &Path,
    snapshot_id: Id,
    title: impl Into<String>,
    rationale: Option<String>,
    patches: Vec<NewPatch>,
) -> Changeset {
    let changeset_id = new_id();
    let mut built = Vec::with_capacity(patches.len());

    for (order, patch) in patches.into_iter().enumerate() {
        let absolute = root.join(&patch.file_path);
        let original_content = fs::read_to_string(&absolute).ok();
        let diff = unified_diff(
            &patch.file_path,
            original_content.as_deref().unwrap_or(""),
            &patch.new_content,
        );
        built.push(Patch {
            id: new_id(),
            changeset_id: changeset_id.clone(),
            file_path: patch.file_path,
            original_content,
            new_content: patch.new_content,
            diff,
            order: order as u32,
        });
    }

    Changeset {
        id: changeset_id,
        snapshot_id,
        title: title.into(),
        rationale,
        status: ChangesetStatus::Proposed,
        created_at: Utc::now(),
        applied_at: None,
        rolled_back_at: None,
        commit_id: None,
        commit_message: None,
        patches: built,
    }
}

/// Produces a unified diff with `--- a/<path>` / `+++ b/<path>` headers and
/// no trailing newline after the last hunk line (spec §6.4).
fn unified_diff(file_path: &str, original: &str, updated: &str) -> String {
    let diff = TextDiff::from_lines(original, updated);
    let unified = diff
        .unified_diff()
        .header(&format!("a/{file_path}"), &format!("b/{file_path}"))
        .to_string();
    unified.trim_end_matches('\n').to_string()
}

/// Applies a `PROPOSED` changeset. Pre-flight re-reads every patch's
/// current file and requires a byte-exact match against `original_content`
/// before any write happens. On a mid-apply I/O failure, attempts a
/// best-effort reverse of already-written patches.
pub fn apply(root: &Path, changeset: &mut Changeset) -> Result<()> {
    if changeset.status != ChangesetStatus::Proposed {
        return Err(CoreError::InvalidTransition {
            message: format!(
                "cannot apply changeset in state {:?}; must be PROPOSED",
                changeset.status
            ),
        });
    }

    for patch in &changeset.patches {
        let absolute = root.join(&patch.file_path);
        let current = fs::read_to_string(&absolute).ok();
        if current != patch.original_content {
            return Err(CoreError::Conflict {
                file_path: patch.file_path.clone(),
            });
        }
    }

    let mut applied_so_far: Vec<&Patch> = Vec::new();
    for patch in &changeset.patches {
        let absolute = root.join(&patch.file_path);
        match write_file(&absolute, &patch.new_content) {
            Ok(()) => applied_so_far.push(patch),
            Err(write_err) => {
                let rollback_ok = reverse_rollback(root, &applied_so_far);
                return Err(CoreError::persistence(format!(
                    "apply failed writing {}: {write_err}; partial rollback {}",
                    patch.file_path,
                    if rollback_ok { "succeeded" } else { "FAILED — manual recovery required" }
                )));
            }
        }
    }

    changeset.status = ChangesetStatus::Applied;
    changeset.applied_at = Some(Utc::now());
    Ok(())
}

fn reverse_rollback(root: &Path, applied: &[&Patch]) -> bool {
    let mut ok = true;
    for patch in applied.iter().rev() {
        let absolute = root.join(&patch.file_path);
        let result = match &patch.original_content {
            Some(original) => write_file(&absolute, original),
            None => fs::remove_file(&absolute).or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(e)
                }
            }),
        };
        if result.is_err() {
            ok = false;
        }
    }
    ok
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Rolls back an `APPLIED` changeset. Patches are reversed in *reverse*
/// order: non-null `original_content` is rewritten; a null
/// `original_content` means this changeset created the file, so it is
/// deleted.
pub fn rollback(root: &Path, changeset: &mut Changeset) -> Result<()> {
    if changeset.status != ChangesetStatus::Applied {
        return Err(CoreError::InvalidTransition {
            message: format!(
                "cannot roll back changeset in state {:?}; must be APPLIED",
                changeset.status
            ),
        });
    }

    for patch in changeset.patches.iter().rev() {
        let absolute = root.join(&patch.file_path);
        match &patch.original_content {
            Some(original) => write_file(&absolute, original)
                .map_err(|e| CoreError::persistence_with_source("rollback write failed", e))?,
            None => fs::remove_file(&absolute).or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(e)
                }
            })
            .map_err(|e| CoreError::persistence_with_source("rollback delete failed", e))?,
        }
    }

    changeset.status = ChangesetStatus::RolledBack;
    changeset.rolled_back_at = Some(Utc::now());
    Ok(())
}

/// Stages the patched paths and records a commit via the VCS collaborator.
/// Refuses unless the changeset is `APPLIED` and has no prior commit.
pub fn commit(
    vcs: &dyn VcsCollaborator,
    changeset: &mut Changeset,
    message: &str,
    author: Option<&str>,
) -> Result<()> {
    if changeset.status != ChangesetStatus::Applied {
        return Err(CoreError::InvalidTransition {
            message: "cannot commit a changeset that has not been applied".to_string(),
        });
    }
    if changeset.commit_id.is_some() {
        return Err(CoreError::InvalidTransition {
            message: "changeset already has a recorded commit".to_string(),
        });
    }

    let paths: Vec<String> = changeset.patches.iter().map(|p| p.file_path.clone()).collect();
    vcs.stage(&paths)?;
    let commit_info = vcs.commit(message, author)?;

    changeset.commit_id = Some(commit_info.sha);
    changeset.commit_message = Some(message.to_string());
    Ok(())
}

/// Deletes a changeset. Allowed only in non-`APPLIED` states.
pub fn delete(changeset: &Changeset) -> Result<()> {
    if changeset.status == ChangesetStatus::Applied {
        return Err(CoreError::InvalidTransition {
            message: "cannot delete an applied changeset; roll it back first".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_captures_original_content_and_diff() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "old\n").unwrap();

        let changeset = create(
            dir.path(),
            new_id(),
            "rename",
            None,
            vec![NewPatch {
                file_path: "a.py".to_string(),
                new_content: "new\n".to_string(),
            }],
        );

        assert_eq!(changeset.status, ChangesetStatus::Proposed);
        assert_eq!(changeset.patches[0].original_content.as_deref(), Some("old\n"));
        assert!(changeset.patches[0].diff.contains("--- a/a.py"));
        assert!(changeset.patches[0].diff.contains("+++ b/a.py"));
    }

    #[test]
    fn create_on_missing_file_has_no_original_content() {
        let dir = tempfile::tempdir().unwrap();
        let changeset = create(
            dir.path(),
            new_id(),
            "add file",
            None,
            vec![NewPatch {
                file_path: "new.py".to_string(),
                new_content: "x = 1\n".to_string(),
            }],
        );
        assert!(changeset.patches[0].original_content.is_none());
    }

    #[test]
    fn apply_writes_new_content_and_transitions_to_applied() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let mut changeset = create(
            dir.path(),
            new_id(),
            "t",
            None,
            vec![NewPatch {
                file_path: "a.py".to_string(),
                new_content: "new\n".to_string(),
            }],
        );

        apply(dir.path(), &mut changeset).unwrap();
        assert_eq!(changeset.status, ChangesetStatus::Applied);
        assert!(changeset.applied_at.is_some());
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "new\n");
    }

    #[test]
    fn apply_rejects_when_file_changed_since_create() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let mut changeset = create(
            dir.path(),
            new_id(),
            "t",
            None,
            vec![NewPatch {
                file_path: "a.py".to_string(),
                new_content: "new\n".to_string(),
            }],
        );

        fs::write(dir.path().join("a.py"), "someone else edited this\n").unwrap();

        let result = apply(dir.path(), &mut changeset);
        assert!(matches!(result, Err(CoreError::Conflict { .. })));
        assert_eq!(changeset.status, ChangesetStatus::Proposed);
        assert_eq!(
            fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "someone else edited this\n"
        );
    }

    #[test]
    fn apply_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let mut changeset = create(
            dir.path(),
            new_id(),
            "t",
            None,
            vec![NewPatch {
                file_path: "a.py".to_string(),
                new_content: "new\n".to_string(),
            }],
        );
        apply(dir.path(), &mut changeset).unwrap();
        let result = apply(dir.path(), &mut changeset);
        assert!(matches!(result, Err(CoreError::InvalidTransition { .. })));
    }

    #[test]
    fn rollback_restores_original_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "old\n").unwrap();
        let mut changeset = create(
            dir.path(),
            new_id(),
            "t",
            None,
            vec![NewPatch {
                file_path: "a.py".to_string(),
                new_content: "new\n".to_string(),
            }],
        );
        apply(dir.path(), &mut changeset).unwrap();
        rollback(dir.path(), &mut changeset).unwrap();

        assert_eq!(changeset.status, ChangesetStatus::RolledBack);
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "old\n");
    }

    #[test]
    fn rollback_deletes_file_created_by_changeset() {
        let dir = tempfile::tempdir().unwrap();
        let mut changeset = create(
            dir.path(),
            new_id(),
            "t",
            None,
            vec![NewPatch {
                file_path: "new.py".to_string(),
                new_content: "x = 1\n".to_string(),
            }],
        );
        apply(dir.path(), &mut changeset).unwrap();
        assert!(dir.path().join("new.py").exists());

        rollback(dir.path(), &mut changeset).unwrap();
        assert!(!dir.path().join("new.py").exists());
    }

    #[test]
    fn delete_is_rejected_while_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut changeset = create(dir.path(), new_id(), "t", None, vec![]);
        apply(dir.path(), &mut changeset).unwrap();
        assert!(delete(&changeset).is_err());
    }

    #[test]
    fn delete_is_allowed_while_proposed() {
        let dir = tempfile::tempdir().unwrap();
        let changeset = create(dir.path(), new_id(), "t", None, vec![]);
        assert!(delete(&changeset).is_ok());
    }
}
