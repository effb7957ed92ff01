//! Structural comparison of unified diffs.
//!
//! Commit checkers compare an agent's patch against a reference patch. Two
//! patches are equivalent when they touch the same files with the same kind
//! of change and the same hunks of added/removed lines, regardless of index
//! lines, hunk offsets or the order files appear in.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};

/// Decides whether two patches describe the same change.
pub trait DiffComparator: Send + Sync {
    fn equivalent(&self, a: &str, b: &str, ignore_whitespace: bool) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    Renamed,
}

/// One changed line inside a hunk; context lines are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Add(String),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
    pub hunks: Vec<Vec<Line>>,
}

/// Default comparator over `git diff`-style unified diffs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnifiedDiff;

impl DiffComparator for UnifiedDiff {
    fn equivalent(&self, a: &str, b: &str, ignore_whitespace: bool) -> Result<bool> {
        let a = index(parse_unified(a)?, ignore_whitespace);
        let b = index(parse_unified(b)?, ignore_whitespace);
        Ok(a == b)
    }
}

fn index(changes: Vec<FileChange>, ignore_whitespace: bool) -> BTreeMap<String, FileChange> {
    changes
        .into_iter()
        .map(|mut change| {
            if ignore_whitespace {
                normalize_whitespace(&mut change);
            }
            (change.path.clone(), change)
        })
        .collect()
}

fn normalize_whitespace(change: &mut FileChange) {
    for hunk in &mut change.hunks {
        for line in hunk.iter_mut() {
            let text = match line {
                Line::Add(text) | Line::Remove(text) => text,
            };
            *text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        hunk.retain(|line| !matches!(line, Line::Add(text) | Line::Remove(text) if text.is_empty()));
    }
    change.hunks.retain(|hunk| !hunk.is_empty());
}

/// Parse a unified diff into per-file changes.
pub fn parse_unified(patch: &str) -> Result<Vec<FileChange>> {
    let mut files: Vec<FileChange> = Vec::new();
    let mut current: Option<FileChange> = None;
    let mut hunk: Option<Vec<Line>> = None;
    // Old/new lines still expected in the open hunk.
    let mut remaining = (0usize, 0usize);

    for (number, line) in patch.lines().enumerate() {
        if let Some(lines) = hunk.as_mut() {
            if line.starts_with('\\') {
                continue;
            }
            if remaining != (0, 0) {
                match line.as_bytes().first() {
                    Some(b'+') => {
                        lines.push(Line::Add(line[1..].to_string()));
                        remaining.1 = remaining.1.saturating_sub(1);
                        continue;
                    }
                    Some(b'-') => {
                        lines.push(Line::Remove(line[1..].to_string()));
                        remaining.0 = remaining.0.saturating_sub(1);
                        continue;
                    }
                    Some(b' ') | None => {
                        remaining.0 = remaining.0.saturating_sub(1);
                        remaining.1 = remaining.1.saturating_sub(1);
                        continue;
                    }
                    _ => {}
                }
            }
            flush_hunk(&mut current, &mut hunk);
        }

        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.extend(current.take());
            current = Some(FileChange {
                path: git_header_path(rest)
                    .ok_or_else(|| anyhow!("line {}: malformed diff header", number + 1))?,
                kind: ChangeKind::Modified,
                hunks: Vec::new(),
            });
            continue;
        }
        if line.starts_with("@@") {
            if current.is_none() {
                return Err(anyhow!("line {}: hunk outside of a file", number + 1));
            }
            remaining = hunk_counts(line)
                .ok_or_else(|| anyhow!("line {}: malformed hunk header '{line}'", number + 1))?;
            hunk = Some(Vec::new());
            continue;
        }
        apply_header(line, &mut current, &mut files);
    }
    flush_hunk(&mut current, &mut hunk);
    files.extend(current);
    Ok(files)
}

/// Line counts of the old and new ranges in `@@ -a,b +c,d @@`.
fn hunk_counts(line: &str) -> Option<(usize, usize)> {
    let (ranges, _) = line.strip_prefix("@@ ")?.split_once(" @@")?;
    let mut parts = ranges.split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;
    let count = |range: &str| match range.split_once(',') {
        Some((_, count)) => count.parse().ok(),
        None => range.parse::<usize>().ok().map(|_| 1),
    };
    Some((count(old)?, count(new)?))
}

fn flush_hunk(current: &mut Option<FileChange>, hunk: &mut Option<Vec<Line>>) {
    if let (Some(file), Some(lines)) = (current.as_mut(), hunk.take()) {
        file.hunks.push(lines);
    }
}

fn apply_header(line: &str, current: &mut Option<FileChange>, files: &mut Vec<FileChange>) {
    // Plain `diff -u` output has no `diff --git` line; start a file at `---`.
    if line.starts_with("--- ") && current.as_ref().is_none_or(|file| !file.hunks.is_empty()) {
        files.extend(current.take());
        *current = Some(FileChange {
            path: String::new(),
            kind: ChangeKind::Modified,
            hunks: Vec::new(),
        });
    }
    let Some(file) = current.as_mut() else {
        return;
    };
    if line.starts_with("new file mode") {
        file.kind = ChangeKind::Added;
    } else if line.starts_with("deleted file mode") {
        file.kind = ChangeKind::Deleted;
    } else if let Some(to) = line.strip_prefix("rename to ") {
        file.kind = ChangeKind::Renamed;
        file.path = to.trim().to_string();
    } else if let Some(old) = line.strip_prefix("--- ") {
        if old.trim() == "/dev/null" {
            file.kind = ChangeKind::Added;
        } else if file.path.is_empty() {
            file.path = strip_side(old);
        }
    } else if let Some(new) = line.strip_prefix("+++ ") {
        if new.trim() == "/dev/null" {
            file.kind = ChangeKind::Deleted;
        } else if file.kind != ChangeKind::Renamed {
            file.path = strip_side(new);
        }
    }
}

fn git_header_path(rest: &str) -> Option<String> {
    let (_, new) = rest.rsplit_once(" b/")?;
    Some(new.trim().to_string())
}

fn strip_side(path: &str) -> String {
    let path = path.split('\t').next().unwrap_or(path).trim();
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}
