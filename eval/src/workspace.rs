//! Workspace creation.
//!
//! Each `setup` without an explicit workdir gets a fresh directory under
//! `eval/workspaces/`, named after the problem with a timestamp and a random
//! suffix so repeated runs never collide.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};

/// A fresh directory for one attempt at a problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Absolute path to the workspace root.
    pub root: PathBuf,
    /// Directory name (problem id, timestamp and random suffix).
    pub name: String,
}

/// Create an empty workspace for problem `id` under `base_dir`.
pub fn create_workspace(base_dir: &Path, id: &str) -> Result<Workspace> {
    fs::create_dir_all(base_dir)
        .with_context(|| format!("create workspace dir {}", base_dir.display()))?;

    let name = build_workspace_name(id, &generate_timestamp(), &generate_short_id());
    let root = base_dir.join(&name);
    fs::create_dir(&root).with_context(|| format!("create workspace root {}", root.display()))?;
    let root = std::path::absolute(&root)
        .with_context(|| format!("resolve workspace root {}", root.display()))?;
    Ok(Workspace { root, name })
}

pub fn build_workspace_name(id: &str, timestamp: &str, short_id: &str) -> String {
    format!("{id}_{timestamp}_{short_id}")
}

pub fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

pub fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}
