//! codemap core library - repository indexing, incremental re-indexing,
//! reference-graph impact analysis, and safe multi-file changeset
//! application.

#![deny(warnings)]

// Global invariants enforced in this crate:
// - A snapshot build is deterministic: identical input yields byte-for-byte
//   identical output (file order, symbol order, ids).
// - No ambient mutable global state; a `SnapshotStore` is always passed in.
// - No randomness or wall-clock reads inside deterministic traversal code.
// - Formatting, comments, and whitespace in source files do not affect the
//   symbols or references extracted from them beyond their line/col spans.

pub mod changeset;
pub mod config;
pub mod error;
pub mod graph;
pub mod ignore_match;
pub mod impact;
pub mod incremental;
pub mod language;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod scanner;
pub mod snapshot_store;
pub mod vcs;

pub use config::{CodemapConfig, ResolvedConfig};
pub use error::{CoreError, ErrorKind, Result};
pub use graph::ReferenceGraph;
pub use impact::{analyze_impact, ImpactReport, RiskLevel};
pub use model::{Changeset, FileRecord, Project, Reference, Snapshot, Symbol};
pub use orchestrator::index_project;
pub use snapshot_store::{InMemorySnapshotStore, JsonSnapshotStore, SnapshotStore};
pub use vcs::{GitVcs, VcsCollaborator};
