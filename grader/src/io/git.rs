//! Git adapter for workspace repositories.
//!
//! Commit answers and the `git` builtins only need a handful of read-mostly
//! operations, so we keep a small, explicit wrapper around `git` subprocess
//! calls.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// The commit at the tip of the current branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub email: String,
    pub summary: String,
    pub message: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True if the workdir is the top level of its own work tree. A directory
    /// nested inside some enclosing repository is not a repo.
    pub fn is_repo(&self) -> bool {
        if !self.workdir.is_dir() {
            return false;
        }
        let out = match self.run(&["rev-parse", "--show-toplevel"]) {
            Ok(out) if out.status.success() => out,
            _ => return false,
        };
        let toplevel = PathBuf::from(String::from_utf8_lossy(&out.stdout).trim());
        match (fs::canonicalize(&toplevel), fs::canonicalize(&self.workdir)) {
            (Ok(toplevel), Ok(workdir)) => toplevel == workdir,
            _ => false,
        }
    }

    /// The most recent commit on HEAD, or `None` for a repository without commits.
    #[instrument(skip_all)]
    pub fn head_commit(&self) -> Result<Option<CommitInfo>> {
        let probe = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !probe.status.success() {
            debug!("repository has no commits");
            return Ok(None);
        }
        let out = self.run_capture(&["log", "-1", "--format=%H%x00%an%x00%ae%x00%s%x00%B", "HEAD"])?;
        let mut parts = out.splitn(5, '\0');
        let mut next = || parts.next().unwrap_or_default().to_string();
        let commit = CommitInfo {
            sha: next(),
            author: next(),
            email: next(),
            summary: next(),
            message: next().trim_end().to_string(),
        };
        if commit.sha.is_empty() {
            return Err(anyhow!("git log returned no commit for HEAD"));
        }
        debug!(sha = %commit.sha, "head commit");
        Ok(Some(commit))
    }

    /// Patch introduced by `rev` relative to its first parent (or the empty tree).
    pub fn show_patch(&self, rev: &str) -> Result<String> {
        self.run_capture(&["show", "--format=", "--patch", "--no-color", "--no-ext-diff", rev])
    }

    /// Number of commits reachable from HEAD (0 without commits).
    pub fn commit_count(&self) -> Result<u64> {
        if self.head_commit()?.is_none() {
            return Ok(0);
        }
        let out = self.run_capture(&["rev-list", "--count", "HEAD"])?;
        out.trim()
            .parse()
            .with_context(|| format!("parse commit count '{}'", out.trim()))
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Initialise a repository with a local identity so commits work anywhere.
    #[instrument(skip_all)]
    pub fn init(&self) -> Result<()> {
        self.run_checked(&["init", "--quiet"])?;
        self.run_checked(&["config", "user.name", "Grader"])?;
        self.run_checked(&["config", "user.email", "grader@local.invalid"])?;
        Ok(())
    }

    /// Stage everything and commit; returns false when there was nothing to commit.
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.run_checked(&["add", "-A"])?;
        let staged = self.run(&["diff", "--cached", "--name-only"])?;
        if String::from_utf8_lossy(&staged.stdout).trim().is_empty() {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        self.run_checked(&["commit", "--quiet", "-m", message])?;
        Ok(true)
    }

    /// Run an arbitrary git command, returning stdout; fails on non-zero exit.
    pub fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
