//! Typed error taxonomy for the indexing/impact/changeset pipeline.
//!
//! Library-tier code returns [`CoreError`]; CLI and other orchestration code
//! composes multiple fallible steps with `anyhow::Result` and relies on
//! `CoreError`'s `std::error::Error` impl to convert automatically.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// The kinds from the error taxonomy, exposed separately from the enum so
/// callers can match on "what category" without destructuring every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProjectHasNoRoot,
    PathMissing,
    PathNotDirectory,
    ScanIo,
    Persistence,
    Conflict,
    InvalidTransition,
    Vcs,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ProjectHasNoRoot => "project_has_no_root",
            ErrorKind::PathMissing => "path_missing",
            ErrorKind::PathNotDirectory => "path_not_directory",
            ErrorKind::ScanIo => "scan_io",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Vcs => "vcs",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("project has no root path configured")]
    ProjectHasNoRoot,

    #[error("path does not exist: {path}")]
    PathMissing { path: PathBuf },

    #[error("path is not a directory: {path}")]
    PathNotDirectory { path: PathBuf },

    #[error("failed to scan {path}: {source}")]
    ScanIoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("conflict applying changeset: {file_path} was modified since the changeset was created")]
    Conflict { file_path: String },

    #[error("invalid changeset transition: {message}")]
    InvalidTransition { message: String },

    #[error("git error: {message}")]
    GitError { message: String },
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ProjectHasNoRoot => ErrorKind::ProjectHasNoRoot,
            CoreError::PathMissing { .. } => ErrorKind::PathMissing,
            CoreError::PathNotDirectory { .. } => ErrorKind::PathNotDirectory,
            CoreError::ScanIoError { .. } | CoreError::PermissionDenied { .. } => {
                ErrorKind::ScanIo
            }
            CoreError::Persistence { .. } => ErrorKind::Persistence,
            CoreError::Conflict { .. } => ErrorKind::Conflict,
            CoreError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CoreError::GitError { .. } => ErrorKind::Vcs,
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        CoreError::Persistence {
            message: message.into(),
            source: None,
        }
    }

    pub fn persistence_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CoreError::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::persistence_with_source("JSON (de)serialization failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_scan_variants() {
        let err = CoreError::ScanIoError {
            path: PathBuf::from("/x"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        };
        assert_eq!(err.kind(), ErrorKind::ScanIo);
    }

    #[test]
    fn conflict_display_includes_path() {
        let err = CoreError::Conflict {
            file_path: "src/x.py".to_string(),
        };
        assert!(err.to_string().contains("src/x.py"));
    }

    #[test]
    fn persistence_from_json_error_chains_source() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(std::error::Error::source(&err).is_some());
    }
}
