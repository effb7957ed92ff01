//! Grading orchestration.
//!
//! Grades one attempt against a loaded namespace and stores the result, or
//! runs setup and grade back to back in a scratch directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use grader::io::scratch::ScratchDir;
use grader::{Namespace, ScoreRecord};
use tracing::{debug, info, instrument};

use crate::results::{CaptureInput, capture_results};
use crate::workspace::{build_workspace_name, generate_short_id, generate_timestamp};

/// A stored grading result.
#[derive(Debug)]
pub struct GradeOutcome {
    pub run_id: String,
    pub results_dir: PathBuf,
    pub record: ScoreRecord,
}

/// Files the grader needs to attribute a run.
#[derive(Debug, Clone, Copy)]
pub struct GradeRequest<'a> {
    pub benchmark_path: &'a Path,
    pub id: &'a str,
    pub workdir: &'a Path,
    pub transcript: &'a str,
}

/// Grade `request` and persist `{meta.json, score.json}` under `results_base`.
#[instrument(skip_all, fields(namespace = %ns.name(), id = %request.id))]
pub fn grade_and_capture(
    results_base: &Path,
    ns: &Namespace,
    request: &GradeRequest<'_>,
) -> Result<GradeOutcome> {
    let started_at = Utc::now();
    let record = ns
        .grade(request.workdir, request.transcript, request.id)
        .with_context(|| format!("grade {}", request.id))?;
    let finished_at = Utc::now();

    let problem = match ns.strip_namespace(request.id) {
        "" => ns.name(),
        name => name,
    };
    let run_id = build_workspace_name(problem, &generate_timestamp(), &generate_short_id());
    let results_dir = capture_results(
        results_base,
        &CaptureInput {
            namespace: ns.name(),
            problem,
            run_id: &run_id,
            benchmark_path: request.benchmark_path,
            transcript: request.transcript,
            workspace: request.workdir,
            started_at,
            finished_at,
            record: &record,
        },
    )
    .context("capture results")?;

    info!(score = record.score, results_dir = %results_dir.display(), "attempt graded");
    Ok(GradeOutcome {
        run_id,
        results_dir,
        record,
    })
}

/// Setup followed by grade in a scratch directory.
#[derive(Debug)]
pub struct CheckOutcome {
    pub instructions: String,
    pub record: ScoreRecord,
    /// Set when the scratch directory was kept for inspection.
    pub kept: Option<PathBuf>,
}

#[instrument(skip_all, fields(namespace = %ns.name(), id = %id))]
pub fn check_problem(ns: &Namespace, id: &str, transcript: &str) -> Result<CheckOutcome> {
    let Some(problem) = ns.problem(id) else {
        bail!(
            "problem '{id}' not found in namespace '{}' (valid: {})",
            ns.name(),
            ns.problem_names().join(", ")
        );
    };
    let scratch = ScratchDir::new(&format!("check-{}", problem.name()))?;
    debug!(scratch = %scratch.path().display(), "checking problem");

    let instructions = ns
        .setup_problem(scratch.path(), id)
        .with_context(|| format!("setup {id}"))?;
    let record = ns
        .grade(scratch.path(), transcript, id)
        .with_context(|| format!("grade {id}"))?;
    let kept = scratch.is_kept().then(|| scratch.path().to_path_buf());
    Ok(CheckOutcome {
        instructions,
        record,
        kept,
    })
}
