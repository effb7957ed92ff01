//! Grader configuration merging.
//!
//! Applies command-line overrides to the configuration loaded from disk.

use std::path::Path;

use anyhow::{Context, Result};
use grader::io::config::{GraderConfig, load_config};

/// Settings given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub fail_fast: bool,
}

/// Load `path` (defaults if missing) and apply `overrides`.
pub fn resolve_config(path: &Path, overrides: &Overrides) -> Result<GraderConfig> {
    let base = load_config(path).context("load grader config")?;
    apply_overrides(base, overrides)
}

/// Apply command-line overrides to the base grader config.
pub fn apply_overrides(mut base: GraderConfig, overrides: &Overrides) -> Result<GraderConfig> {
    if overrides.fail_fast {
        base.fail_fast = true;
    }
    base.validate()?;
    Ok(base)
}
