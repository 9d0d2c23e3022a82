//! Scanner (spec §4.B): deterministic filesystem traversal, binary
//! detection, size gating, and content hashing.
//!
//! Global invariants enforced:
//! - Deterministic traversal order (lexicographic by relpath)
//! - Identical input yields byte-for-byte identical output

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};
use crate::ignore_match::IgnoreMatcher;
use crate::language::Language;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "svg", "webp", "mp3", "mp4", "wav", "avi", "mov", "zip",
    "tar", "gz", "rar", "7z", "exe", "dll", "so", "dylib", "pdf", "doc", "docx", "xls", "xlsx",
    "pyc", "pyo", "class", "o", "obj", "woff", "woff2", "ttf", "eot", "otf", "db", "sqlite",
    "sqlite3",
];

/// The Scanner's output record for one file (spec §4.B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub relpath: String,
    pub absolute_path: PathBuf,
    pub language: Option<Language>,
    pub size_bytes: u64,
    pub is_binary: bool,
    pub sha256: Option<String>,
    pub line_count: usize,
    pub content: Option<String>,
}

pub struct ScanOptions {
    pub max_file_size: u64,
    pub include_content: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            include_content: true,
        }
    }
}

/// Walk `root` and return scanned files in deterministic (lexicographic by
/// relpath) order.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<Vec<ScannedFile>> {
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

    let matcher = IgnoreMatcher::load(root);
    let mut files = Vec::new();
    let mut visited_real_paths = HashSet::new();
    walk(root, root, &matcher, options, &mut visited_real_paths, &mut files)?;

    files.sort_by(|a, b| a.relpath.cmp(&b.relpath));
    Ok(files)
}

fn walk(
    root: &Path,
    dir: &Path,
    matcher: &IgnoreMatcher,
    options: &ScanOptions,
    visited_real_paths: &mut HashSet<PathBuf>,
    out: &mut Vec<ScannedFile>,
) -> Result<()> {
    let real_dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    if !visited_real_paths.insert(real_dir) {
        return Ok(());
    }

    let entries = fs::read_dir(dir).map_err(|source| CoreError::ScanIoError {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry_result in entries {
        let entry = match entry_result {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        let relpath = match path.strip_prefix(root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };

        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };

        if metadata.is_dir() {
            if matcher.matches(&relpath, true) {
                continue;
            }
            walk(root, &path, matcher, options, visited_real_paths, out)?;
        } else if metadata.is_file() {
            if matcher.matches(&relpath, false) {
                continue;
            }
            if let Some(scanned) = scan_file(&path, &relpath, metadata.len(), options) {
                out.push(scanned);
            }
        }
    }

    Ok(())
}

fn scan_file(
    absolute_path: &Path,
    relpath: &Path,
    size_bytes: u64,
    options: &ScanOptions,
) -> Option<ScannedFile> {
    let relpath_str = normalize_relpath(relpath);
    let language = Language::from_path(relpath);

    if size_bytes > options.max_file_size {
        return Some(ScannedFile {
            relpath: relpath_str,
            absolute_path: absolute_path.to_path_buf(),
            language,
            size_bytes,
            is_binary: false,
            sha256: None,
            line_count: 0,
            content: None,
        });
    }

    let bytes = fs::read(absolute_path).ok()?;
    let is_binary = is_binary_file(relpath, &bytes);
    let sha256 = Some(hex_sha256(&bytes));

    if is_binary {
        return Some(ScannedFile {
            relpath: relpath_str,
            absolute_path: absolute_path.to_path_buf(),
            language,
            size_bytes,
            is_binary: true,
            sha256,
            line_count: 0,
            content: None,
        });
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    let line_count = count_lines(&text);
    let content = if options.include_content {
        Some(text)
    } else {
        None
    };

    Some(ScannedFile {
        relpath: relpath_str,
        absolute_path: absolute_path.to_path_buf(),
        language,
        size_bytes,
        is_binary: false,
        sha256,
        line_count,
        content,
    })
}

fn is_binary_file(relpath: &Path, bytes: &[u8]) -> bool {
    if let Some(ext) = relpath.extension().and_then(|e| e.to_str()) {
        if BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return true;
        }
    }
    bytes.iter().take(8192).any(|&b| b == 0)
}

fn count_lines(text: &str) -> usize {
    text.matches('\n').count() + 1
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Normalizes a relative path to use `/` separators (spec invariant 7).
fn normalize_relpath(relpath: &Path) -> String {
    relpath
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_root_fails() {
        let result = scan(Path::new("/does/not/exist"), &ScanOptions::default());
        assert!(matches!(result, Err(CoreError::PathMissing { .. })));
    }

    #[test]
    fn file_root_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, "hi").unwrap();
        let result = scan(&file_path, &ScanOptions::default());
        assert!(matches!(result, Err(CoreError::PathNotDirectory { .. })));
    }

    #[test]
    fn scan_is_deterministic_and_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("a.py"), "y = 2\n").unwrap();

        let r1 = scan(dir.path(), &ScanOptions::default()).unwrap();
        let r2 = scan(dir.path(), &ScanOptions::default()).unwrap();

        assert_eq!(r1, r2);
        assert_eq!(r1.len(), 2);
        assert_eq!(r1[0].relpath, "a.py");
        assert_eq!(r1[1].relpath, "b.py");
    }

    #[test]
    fn always_ignored_dirs_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg.js"), "x").unwrap();
        std::fs::write(dir.path().join("main.js"), "x").unwrap();

        let result = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].relpath, "main.js");
    }

    #[test]
    fn binary_detected_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        let result = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert!(result[0].is_binary);
        assert_eq!(result[0].content, None);
    }

    #[test]
    fn binary_detected_by_nul_byte() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("mystery.dat")).unwrap();
        f.write_all(&[1, 2, 0, 3]).unwrap();
        let result = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert!(result[0].is_binary);
    }

    #[test]
    fn oversized_file_has_no_content_or_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(10)).unwrap();
        let options = ScanOptions {
            max_file_size: 5,
            include_content: true,
        };
        let result = scan(dir.path(), &options).unwrap();
        assert_eq!(result[0].content, None);
        assert_eq!(result[0].sha256, None);
    }

    #[test]
    fn language_detected_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.py"), "pass\n").unwrap();
        let result = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(result[0].language, Some(Language::Python));
    }

    #[test]
    fn line_count_counts_newlines_plus_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree").unwrap();
        let result = scan(dir.path(), &ScanOptions::default()).unwrap();
        assert_eq!(result[0].line_count, 3);
    }
}
