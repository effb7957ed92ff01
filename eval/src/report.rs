use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::results::{load_meta, load_score};

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub runs: usize,
    pub avg_duration_secs: Option<f64>,
    pub problems: BTreeMap<String, ProblemStats>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProblemStats {
    pub runs: usize,
    pub total_score: f64,
    /// Runs that scored 1.0.
    pub perfect: usize,
}

impl ProblemStats {
    pub fn mean_score(&self) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        self.total_score / self.runs as f64
    }
}

pub fn load_run_dirs(namespace_results_dir: &Path) -> Result<Vec<PathBuf>> {
    if !namespace_results_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(namespace_results_dir)
        .with_context(|| format!("read {}", namespace_results_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn aggregate(namespace_results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();

    for run_dir in load_run_dirs(namespace_results_dir)? {
        let meta = match load_meta(&run_dir) {
            Ok(meta) => meta,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: meta.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };
        let record = match load_score(&run_dir) {
            Ok(record) => record,
            Err(err) => {
                warnings.push(format!(
                    "skip {}: score.json invalid ({err:#})",
                    run_dir.display()
                ));
                continue;
            }
        };

        summary.runs += 1;
        summary.avg_duration_secs = Some(match summary.avg_duration_secs {
            None => meta.duration_secs,
            Some(avg) => {
                let total = avg * (summary.runs as f64 - 1.0) + meta.duration_secs;
                total / summary.runs as f64
            }
        });

        let stats = summary.problems.entry(meta.problem).or_default();
        stats.runs += 1;
        stats.total_score += record.score;
        if record.score >= 1.0 {
            stats.perfect += 1;
        }
    }

    Ok((summary, warnings))
}
