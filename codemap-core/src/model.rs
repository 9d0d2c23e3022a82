//! Entities of the data model (spec §3): Project, Snapshot, File, Symbol,
//! Reference, Changeset, Patch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::language::Language;

pub type Id = String;

pub fn new_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            root_path: None,
            default_branch: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotState {
    Pending,
    Indexing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Id,
    pub project_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub state: SnapshotState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub file_count: usize,
    pub symbol_count: usize,
    pub total_lines: usize,
    pub index_schema_version: u32,
}

pub const INDEX_SCHEMA_VERSION: u32 = 1;

impl Snapshot {
    pub fn new(project_id: Id, commit_id: Option<String>, branch: Option<String>) -> Self {
        Self {
            id: new_id(),
            project_id,
            commit_id,
            branch,
            state: SnapshotState::Pending,
            progress: 0,
            error_message: None,
            file_count: 0,
            symbol_count: 0,
            total_lines: 0,
            index_schema_version: INDEX_SCHEMA_VERSION,
        }
    }

    /// Invariant 4: READY <=> progress == 100 && error_message.is_none();
    /// FAILED <=> error_message.is_some(); INDEXING <=> 0 <= progress < 100.
    pub fn state_invariant_holds(&self) -> bool {
        match self.state {
            SnapshotState::Ready => self.progress == 100 && self.error_message.is_none(),
            SnapshotState::Failed => self.error_message.is_some(),
            SnapshotState::Indexing => self.progress < 100,
            SnapshotState::Pending => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Id,
    pub snapshot_id: Id,
    /// Relative to project root, forward-slash normalized (invariant 7).
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    pub size_bytes: u64,
    pub line_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub is_binary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Method,
    Property,
    Variable,
    Constant,
    Interface,
    Type,
    Enum,
    Import,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: Id,
    pub snapshot_id: Id,
    pub file_id: Id,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    pub kind: SymbolKind,
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: usize,
    pub end_col: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Id>,
    /// True when `end_line` was approximated by the regex fallback rather
    /// than derived from a true end-of-body span (SPEC_FULL.md §9).
    #[serde(default)]
    pub span_approximate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Import,
    Call,
    Usage,
    Inheritance,
    Implementation,
    TypeReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceTarget {
    Symbol(Id),
    File(Id),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: Id,
    pub snapshot_id: Id,
    pub from_symbol_id: Id,
    pub target: ReferenceTarget,
    pub kind: ReferenceKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangesetStatus {
    Proposed,
    Applied,
    RolledBack,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: Id,
    pub snapshot_id: Id,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub status: ChangesetStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
    pub patches: Vec<Patch>,
}

impl Changeset {
    /// Invariant 5: status != APPLIED => applied_at.is_none().
    pub fn state_invariant_holds(&self) -> bool {
        if self.status != ChangesetStatus::Applied && self.applied_at.is_some() {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: Id,
    pub changeset_id: Id,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    pub new_content: String,
    pub diff: String,
    pub order: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_ready_invariant() {
        let mut s = Snapshot::new(new_id(), None, None);
        s.state = SnapshotState::Ready;
        s.progress = 100;
        assert!(s.state_invariant_holds());
        s.error_message = Some("oops".into());
        assert!(!s.state_invariant_holds());
    }

    #[test]
    fn snapshot_indexing_requires_incomplete_progress() {
        let mut s = Snapshot::new(new_id(), None, None);
        s.state = SnapshotState::Indexing;
        s.progress = 50;
        assert!(s.state_invariant_holds());
        s.progress = 100;
        assert!(!s.state_invariant_holds());
    }

    #[test]
    fn changeset_non_applied_has_no_applied_at() {
        let cs = Changeset {
            id: new_id(),
            snapshot_id: new_id(),
            title: "t".into(),
            rationale: None,
            status: ChangesetStatus::Proposed,
            created_at: Utc::now(),
            applied_at: None,
            rolled_back_at: None,
            commit_id: None,
            commit_message: None,
            patches: vec![],
        };
        assert!(cs.state_invariant_holds());
    }
}
