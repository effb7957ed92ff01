//! Grader configuration (`grader.toml`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Grader configuration (TOML).
///
/// Missing fields default to values suitable for interactive authoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GraderConfig {
    /// Abort a grading fragment at the first failed assertion.
    pub fail_fast: bool,

    /// Wall-clock budget in seconds for each `run`/`git` builtin call.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr of commands beyond this many bytes.
    pub command_output_limit_bytes: usize,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            command_timeout_secs: 60,
            command_output_limit_bytes: 100_000,
        }
    }
}

impl GraderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GraderConfig::default()`.
pub fn load_config(path: &Path) -> Result<GraderConfig> {
    if !path.exists() {
        let cfg = GraderConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GraderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, GraderConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("grader.toml");
        fs::write(&path, "fail_fast = true\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert!(cfg.fail_fast);
        assert_eq!(cfg.command_timeout_secs, 60);
    }

    #[test]
    fn rejects_zero_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("grader.toml");
        fs::write(&path, "command_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("command_timeout_secs"));
    }
}
