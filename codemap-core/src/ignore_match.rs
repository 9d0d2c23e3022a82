//! Ignore matcher (spec §4.A): resolves whether a relative path should be
//! excluded from a scan.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Directory names that are always pruned, regardless of `.gitignore`
/// negation (spec §4.A). Always-ignore wins over any user negation.
pub const ALWAYS_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".venv",
    "venv",
    "env",
    ".env",
    ".next",
    ".nuxt",
    "dist",
    "build",
    "out",
    ".idea",
    ".vscode",
    "coverage",
    ".coverage",
    "htmlcov",
    ".tox",
    ".nox",
];

/// Combines a repository's `.gitignore` (when present) with the fixed
/// always-ignore directory set.
pub struct IgnoreMatcher {
    gitignore: Option<Gitignore>,
}

impl IgnoreMatcher {
    /// Build a matcher for `root`. Missing or unreadable `.gitignore` is not
    /// an error — the matcher simply falls back to the always-ignore set.
    pub fn load(root: &Path) -> Self {
        let gitignore_path = root.join(".gitignore");
        let gitignore = if gitignore_path.is_file() {
            let mut builder = GitignoreBuilder::new(root);
            if builder.add(&gitignore_path).is_none() {
                builder.build().ok()
            } else {
                None
            }
        } else {
            None
        };
        IgnoreMatcher { gitignore }
    }

    /// `true` if `relpath` (relative to the scan root) should be excluded.
    /// `is_dir` affects gitignore directory-only pattern matching.
    pub fn matches(&self, relpath: &Path, is_dir: bool) -> bool {
        if relpath
            .components()
            .any(|c| matches!(c.as_os_str().to_str(), Some(name) if ALWAYS_IGNORE_DIRS.contains(&name)))
        {
            return true;
        }

        if let Some(gi) = &self.gitignore {
            return gi.matched(relpath, is_dir).is_ignore();
        }

        false
    }
}
