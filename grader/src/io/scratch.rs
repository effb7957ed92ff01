//! Scratch workspaces created on a caller's behalf.
//!
//! Scratch directories are removed on drop unless `GRADER_KEEP_SCRATCH` was
//! set (`1`/`true`) when the flag was first read. The flag is read once per
//! process.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info};

pub const KEEP_SCRATCH_ENV: &str = "GRADER_KEEP_SCRATCH";

static KEEP_SCRATCH: OnceLock<bool> = OnceLock::new();

/// Process-wide debug flag: keep scratch directories after use.
pub fn keep_scratch() -> bool {
    *KEEP_SCRATCH.get_or_init(|| {
        std::env::var(KEEP_SCRATCH_ENV)
            .map(|value| parse_flag(&value))
            .unwrap_or(false)
    })
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// A temporary workspace directory.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl ScratchDir {
    /// Create a scratch directory honouring the process-wide keep flag.
    pub fn new(prefix: &str) -> Result<Self> {
        Self::with_keep(prefix, keep_scratch())
    }

    pub fn with_keep(prefix: &str, keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{prefix}-"))
            .tempdir()
            .context("create scratch dir")?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), keep, "scratch dir created");
        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the directory survives drop.
    pub fn is_kept(&self) -> bool {
        self.keep
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.keep {
            let kept = dir.keep();
            info!(path = %kept.display(), "keeping scratch dir");
        } else {
            debug!(path = %self.path.display(), "removing scratch dir");
            drop(dir);
        }
    }
}
