//! VCS collaborator (spec §6.5): the one pluggable interface the changeset
//! applier depends on for staging and committing. The default
//! implementation shells out to the `git` CLI, following the teacher's
//! subprocess-wrapper idiom in `git.rs`.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub is_current: bool,
    pub commit_sha: String,
    pub last_commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitLogEntry {
    pub sha: String,
    pub short_sha: String,
    pub message: String,
    pub author: String,
    pub author_email: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
}

/// The interface the core depends on for VCS operations (spec §6.5).
/// Implementations may shell out to an external VCS; that is the only
/// hard dependency the contract assumes.
pub trait VcsCollaborator {
    fn is_repo(&self) -> bool;
    fn current_branch(&self) -> Result<Option<String>>;
    fn current_commit(&self) -> Result<Option<String>>;
    fn list_branches(&self) -> Result<Vec<BranchInfo>>;
    fn list_commits(&self, limit: usize, branch: Option<&str>) -> Result<Vec<CommitLogEntry>>;
    fn stage(&self, paths: &[String]) -> Result<()>;
    fn commit(&self, message: &str, author: Option<&str>) -> Result<CommitInfo>;
    fn checkout(&self, branch: &str) -> Result<()>;
    fn stash_push(&self, message: Option<&str>) -> Result<bool>;
    fn stash_pop(&self) -> Result<bool>;
}

/// Shells out to the `git` binary against a fixed working directory.
pub struct GitVcs {
    repo_root: PathBuf,
}

impl GitVcs {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        GitVcs {
            repo_root: repo_root.into(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .current_dir(&self.repo_root)
            .args(args)
            .output()
            .map_err(|e| CoreError::GitError {
                message: format!("failed to invoke git: {e}"),
            })?;

        if !output.status.success() {
            return Err(CoreError::GitError {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VcsCollaborator for GitVcs {
    fn is_repo(&self) -> bool {
        self.git(&["rev-parse", "--git-dir"]).is_ok()
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if branch.is_empty() || branch == "HEAD" {
            Ok(None)
        } else {
            Ok(Some(branch))
        }
    }

    fn current_commit(&self) -> Result<Option<String>> {
        match self.git(&["rev-parse", "HEAD"]) {
            Ok(sha) => Ok(Some(sha)),
            Err(_) => Ok(None),
        }
    }

    fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        let raw = self.git(&[
            "for-each-ref",
            "--format=%(refname:short)\t%(objectname)\t%(contents:subject)",
            "refs/heads/",
        ])?;
        let current = self.current_branch()?;

        let mut branches = Vec::new();
        for line in raw.lines() {
            let mut parts = line.splitn(3, '\t');
            let (Some(name), Some(sha), Some(subject)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            branches.push(BranchInfo {
                is_current: current.as_deref() == Some(name),
                name: name.to_string(),
                commit_sha: sha.to_string(),
                last_commit_message: subject.to_string(),
            });
        }
        Ok(branches)
    }

    fn list_commits(&self, limit: usize, branch: Option<&str>) -> Result<Vec<CommitLogEntry>> {
        let limit_arg = format!("-{limit}");
        let mut args = vec![
            "log",
            limit_arg.as_str(),
            "--format=%H\t%h\t%s\t%an\t%ae\t%aI",
        ];
        if let Some(branch) = branch {
            args.push(branch);
        }
        let raw = self.git(&args)?;

        let mut commits = Vec::new();
        for line in raw.lines() {
            let mut parts = line.splitn(6, '\t');
            let (Some(sha), Some(short_sha), Some(message), Some(author), Some(author_email), Some(date)) = (
                parts.next(),
                parts.next(),
                parts.next(),
                parts.next(),
                parts.next(),
                parts.next(),
            ) else {
                continue;
            };
            commits.push(CommitLogEntry {
                sha: sha.to_string(),
                short_sha: short_sha.to_string(),
                message: message.to_string(),
                author: author.to_string(),
                author_email: author_email.to_string(),
                date: date.to_string(),
            });
        }
        Ok(commits)
    }

    fn stage(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(|p| p.as_str()));
        self.git(&args)?;
        Ok(())
    }

    fn commit(&self, message: &str, author: Option<&str>) -> Result<CommitInfo> {
        let mut args = vec!["commit", "-m", message];
        if let Some(author) = author {
            args.push("--author");
            args.push(author);
        }
        self.git(&args)?;
        let sha = self.git(&["rev-parse", "HEAD"])?;
        Ok(CommitInfo { sha })
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", branch])?;
        Ok(())
    }

    fn stash_push(&self, message: Option<&str>) -> Result<bool> {
        let mut args = vec!["stash", "push"];
        if let Some(message) = message {
            args.push("-m");
            args.push(message);
        }
        let output = self.git(&args)?;
        Ok(!output.contains("No local changes to save"))
    }

    fn stash_pop(&self) -> Result<bool> {
        match self.git(&["stash", "pop"]) {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

/// Returns `true` if `path` is inside a working git tree (spec §6.5
/// `is_repo`, exposed as a free function for callers without a `GitVcs`
/// handle yet).
pub fn is_git_repo(path: &Path) -> bool {
    GitVcs::new(path).is_repo()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_repo_directory_reports_not_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_git_repo(dir.path()));
    }

    #[test]
    fn non_repo_stage_and_commit_surface_git_error() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = GitVcs::new(dir.path());
        let result = vcs.commit("message", None);
        assert!(matches!(result, Err(CoreError::GitError { .. })));
    }
}
