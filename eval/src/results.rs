//! Result capture and persistence.
//!
//! Each graded attempt is stored as `meta.json` plus `score.json` under
//! `<results>/<namespace>/<run id>/` for later aggregation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use grader::ScoreRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

/// Input for capturing one graded attempt.
#[derive(Debug)]
pub struct CaptureInput<'a> {
    pub namespace: &'a str,
    pub problem: &'a str,
    pub run_id: &'a str,
    pub benchmark_path: &'a Path,
    pub transcript: &'a str,
    pub workspace: &'a Path,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub record: &'a ScoreRecord,
}

/// Metadata for a graded attempt, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EvalMeta {
    pub namespace: String,
    pub problem: String,
    pub run_id: String,
    /// SHA-256 of the benchmark file, to tell apart runs against edited problems.
    pub benchmark_hash: String,
    pub transcript_hash: String,
    pub score: f64,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub workspace: String,
    /// Non-fatal errors encountered during capture.
    #[serde(default)]
    pub errors: Vec<String>,
}

#[instrument(skip_all, fields(namespace = %input.namespace, run_id = %input.run_id))]
pub fn capture_results(base_dir: &Path, input: &CaptureInput<'_>) -> Result<PathBuf> {
    let results_dir = results_dir(base_dir, input.namespace, input.run_id);
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("create results dir {}", results_dir.display()))?;

    let mut errors = Vec::new();
    let benchmark_hash = match file_sha256(input.benchmark_path) {
        Ok(hash) => hash,
        Err(err) => {
            errors.push(format!("benchmark hash: {err:#}"));
            String::new()
        }
    };
    if !errors.is_empty() {
        warn!(errors = ?errors, "result capture had errors");
    }

    let duration = input.finished_at - input.started_at;
    let meta = EvalMeta {
        namespace: input.namespace.to_string(),
        problem: input.problem.to_string(),
        run_id: input.run_id.to_string(),
        benchmark_hash,
        transcript_hash: sha256_hex(input.transcript.as_bytes()),
        score: input.record.score,
        start_time: input.started_at.to_rfc3339(),
        end_time: input.finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        workspace: input.workspace.display().to_string(),
        errors,
    };

    write_json(&results_dir.join("meta.json"), &meta)?;
    write_json(&results_dir.join("score.json"), input.record)?;
    debug!(results_dir = %results_dir.display(), "results captured");
    Ok(results_dir)
}

pub fn results_dir(base_dir: &Path, namespace: &str, run_id: &str) -> PathBuf {
    base_dir.join(namespace).join(run_id)
}

pub fn load_meta(run_dir: &Path) -> Result<EvalMeta> {
    read_json(&run_dir.join("meta.json"))
}

pub fn load_score(run_dir: &Path) -> Result<ScoreRecord> {
    read_json(&run_dir.join("score.json"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    fs::write(path, format!("{contents}\n")).with_context(|| format!("write {}", path.display()))
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(sha256_hex(&contents))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn results_dir_is_stable() {
        let dir = results_dir(Path::new("/tmp/results"), "arith", "add_1");
        assert_eq!(dir, PathBuf::from("/tmp/results/arith/add_1"));
    }

    #[test]
    fn captured_results_round_trip() {
        let temp = tempdir().expect("tempdir");
        let benchmark = temp.path().join("arith.toml");
        fs::write(&benchmark, "namespace = \"arith\"\n").expect("benchmark");
        let record = ScoreRecord::zero_with_error("add", "wrong");

        let started_at = Utc::now();
        let input = CaptureInput {
            namespace: "arith",
            problem: "add",
            run_id: "add_20260101_000000_abc123",
            benchmark_path: &benchmark,
            transcript: "<answer>5</answer>",
            workspace: temp.path(),
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1500),
            record: &record,
        };
        let dir = capture_results(&temp.path().join("results"), &input).expect("capture");

        let meta = load_meta(&dir).expect("meta");
        assert_eq!(meta.problem, "add");
        assert_eq!(meta.duration_secs, 1.5);
        assert_eq!(meta.benchmark_hash.len(), 64);
        assert_eq!(meta.transcript_hash, sha256_hex(b"<answer>5</answer>"));
        assert!(meta.errors.is_empty());

        assert_eq!(load_score(&dir).expect("score"), record);
    }

    #[test]
    fn missing_benchmark_is_recorded_not_fatal() {
        let temp = tempdir().expect("tempdir");
        let record = ScoreRecord::zero_with_error("add", "x");
        let now = Utc::now();
        let input = CaptureInput {
            namespace: "arith",
            problem: "add",
            run_id: "r",
            benchmark_path: &temp.path().join("gone.toml"),
            transcript: "",
            workspace: temp.path(),
            started_at: now,
            finished_at: now,
            record: &record,
        };
        let dir = capture_results(temp.path(), &input).expect("capture");
        let meta = load_meta(&dir).expect("meta");
        assert!(meta.benchmark_hash.is_empty());
        assert_eq!(meta.errors.len(), 1);
    }
}
