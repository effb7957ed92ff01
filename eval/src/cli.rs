//! CLI command implementations.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use grader::Namespace;
use grader::io::benchmark_file::load_namespace;
use grader::io::config::GraderConfig;
use tracing::{debug, info};

use crate::report::aggregate;
use crate::run::{GradeRequest, check_problem, grade_and_capture};
use crate::workspace::create_workspace;

/// Where the CLI keeps workspaces and results, relative to the repo root.
#[derive(Debug, Clone)]
pub struct EvalPaths {
    pub workspaces: PathBuf,
    pub results: PathBuf,
}

impl EvalPaths {
    pub fn new(repo_root: &Path) -> Self {
        let eval = repo_root.join("eval");
        Self {
            workspaces: eval.join("workspaces"),
            results: eval.join("results"),
        }
    }
}

fn load(file: &Path, config: &GraderConfig) -> Result<Namespace> {
    let ns = load_namespace(file, config)?;
    debug!(namespace = ns.name(), problems = ns.problem_names().len(), "benchmark loaded");
    Ok(ns)
}

/// Print the problem listing of a benchmark file as JSON.
pub fn list_problems(file: &Path, config: &GraderConfig) -> Result<()> {
    let ns = load(file, config)?;
    let listing = serde_json::to_string_pretty(&ns.list_problems()).context("serialize listing")?;
    println!("{listing}");
    Ok(())
}

/// Prepare a workspace and print the agent's instructions.
pub fn setup_problem(
    paths: &EvalPaths,
    file: &Path,
    id: &str,
    workdir: Option<PathBuf>,
    config: &GraderConfig,
) -> Result<()> {
    let ns = load(file, config)?;
    let workdir = match (workdir, ns.problem(id)) {
        (Some(dir), _) => dir,
        (None, Some(problem)) => create_workspace(&paths.workspaces, problem.name())
            .context("create workspace")?
            .root,
        // Unknown or empty ids only describe the namespace.
        (None, None) => {
            println!("{}", ns.setup_problem(&paths.workspaces, id)?);
            return Ok(());
        }
    };
    let instructions = ns
        .setup_problem(&workdir, id)
        .with_context(|| format!("setup {id}"))?;
    info!(id, workdir = %workdir.display(), "problem set up");
    println!("workspace: {}", workdir.display());
    println!();
    println!("{instructions}");
    Ok(())
}

/// Grade an attempt, print the score record and store the result.
pub fn grade_problem(
    paths: &EvalPaths,
    file: &Path,
    id: &str,
    workdir: &Path,
    transcript: &str,
    config: &GraderConfig,
) -> Result<()> {
    let ns = load(file, config)?;
    let transcript = read_transcript(transcript)?;
    let outcome = grade_and_capture(
        &paths.results,
        &ns,
        &GradeRequest {
            benchmark_path: file,
            id,
            workdir,
            transcript: &transcript,
        },
    )?;
    let json = serde_json::to_string_pretty(&outcome.record).context("serialize score")?;
    println!("{json}");
    eprintln!(
        "grade: namespace={} run_id={} results={}",
        ns.name(),
        outcome.run_id,
        outcome.results_dir.display()
    );
    Ok(())
}

/// Run setup and grade in a scratch directory.
pub fn check_problem_file(
    file: &Path,
    id: &str,
    transcript: &str,
    config: &GraderConfig,
) -> Result<()> {
    let ns = load(file, config)?;
    let transcript = read_transcript(transcript)?;
    let outcome = check_problem(&ns, id, &transcript)?;
    println!("{}", outcome.instructions);
    println!();
    let json = serde_json::to_string_pretty(&outcome.record).context("serialize score")?;
    println!("{json}");
    if let Some(kept) = outcome.kept {
        eprintln!("check: scratch kept at {}", kept.display());
    }
    Ok(())
}

/// Show per-problem aggregates of the stored results for a namespace.
pub fn report_namespace(paths: &EvalPaths, namespace: &str) -> Result<()> {
    let (summary, warnings) = aggregate(&paths.results.join(namespace))?;
    println!("report: namespace={} runs={}", namespace, summary.runs);
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={avg:.2}");
    }
    for (problem, stats) in &summary.problems {
        println!(
            "report: problem {} runs={} mean_score={:.3} perfect={}/{}",
            problem,
            stats.runs,
            stats.mean_score(),
            stats.perfect,
            stats.runs
        );
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

/// A transcript file, or stdin for `-`.
fn read_transcript(source: &str) -> Result<String> {
    if source == "-" {
        let mut transcript = String::new();
        std::io::stdin()
            .read_to_string(&mut transcript)
            .context("read transcript from stdin")?;
        return Ok(transcript);
    }
    std::fs::read_to_string(source).with_context(|| format!("read transcript {source}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARITH: &str = r#"
namespace = "arith"

[[problem]]
name = "add"
body = 'Value("What is 2+2?") == 4'
"#;

    #[test]
    fn bundled_benchmarks_compile() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("benchmarks");
        let namespaces = grader::io::benchmark_file::discover(&dir, &GraderConfig::default())
            .expect("bundled benchmarks");
        let names: Vec<_> = namespaces.iter().map(Namespace::name).collect();
        assert_eq!(names, vec!["arith", "workspace"]);
    }

    #[test]
    fn bundled_arith_problems_grade() {
        let file = Path::new(env!("CARGO_MANIFEST_DIR")).join("benchmarks/arith.toml");
        let ns = load(&file, &GraderConfig::default()).expect("load");
        let score = |id: &str, answer: &str| {
            check_problem(&ns, id, &format!("<answer>{answer}</answer>"))
                .expect("check")
                .record
                .score
        };
        assert_eq!(score("add", "4"), 1.0);
        assert_eq!(score("divide", "3.5"), 1.0);
        assert_eq!(score("divide", "3"), 0.0);
        assert_eq!(score("primes", "[2, 3, 5, 7]"), 1.0);
        assert_eq!(score("primes", "[2, 3, 5]"), 0.0);
    }

    #[test]
    fn eval_paths_live_under_eval() {
        let paths = EvalPaths::new(Path::new("/repo"));
        assert_eq!(paths.workspaces, PathBuf::from("/repo/eval/workspaces"));
        assert_eq!(paths.results, PathBuf::from("/repo/eval/results"));
    }

    #[test]
    fn reads_transcript_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("t.txt");
        std::fs::write(&path, "<answer>4</answer>").expect("write");
        let transcript = read_transcript(path.to_str().expect("utf-8 path")).expect("read");
        assert_eq!(transcript, "<answer>4</answer>");
        assert!(read_transcript("/nonexistent/transcript.txt").is_err());
    }

    #[test]
    fn setup_then_grade_stores_a_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = EvalPaths::new(temp.path());
        let file = temp.path().join("arith.toml");
        std::fs::write(&file, ARITH).expect("benchmark");
        let transcript = temp.path().join("t.txt");
        std::fs::write(&transcript, "<answer>4</answer>").expect("transcript");
        let config = GraderConfig::default();

        setup_problem(&paths, &file, "add", None, &config).expect("setup");
        let created: Vec<_> = std::fs::read_dir(&paths.workspaces)
            .expect("workspaces")
            .collect();
        assert_eq!(created.len(), 1);

        grade_problem(
            &paths,
            &file,
            "arith-add",
            temp.path(),
            transcript.to_str().expect("utf-8 path"),
            &config,
        )
        .expect("grade");
        let (summary, _) = aggregate(&paths.results.join("arith")).expect("report");
        assert_eq!(summary.runs, 1);
        assert_eq!(summary.problems["add"].mean_score(), 1.0);
    }
}
