mod cli;
mod config;
mod report;
mod results;
mod run;
mod workspace;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::cli::EvalPaths;
use crate::config::{Overrides, resolve_config};

#[derive(Parser)]
#[command(name = "eval", version, about = "Author, set up and grade benchmark problems")]
struct Cli {
    /// Grader configuration file (defaults apply when missing).
    #[arg(long, global = true, default_value = "grader.toml")]
    config: PathBuf,
    /// Stop grading a problem at its first failed assertion.
    #[arg(long, global = true)]
    fail_fast: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the problems of a benchmark file as JSON.
    List { file: PathBuf },
    /// Prepare a workspace and print the agent's instructions.
    Setup {
        file: PathBuf,
        id: String,
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
    /// Grade an attempt and store the score record.
    Grade {
        file: PathBuf,
        id: String,
        #[arg(long)]
        workdir: PathBuf,
        /// Transcript file, or `-` for stdin.
        #[arg(long)]
        transcript: String,
    },
    /// Set up and grade in a scratch directory.
    Check {
        file: PathBuf,
        id: String,
        #[arg(long)]
        transcript: String,
    },
    /// Per-problem aggregates of stored results.
    Report { namespace: String },
}

fn main() -> Result<()> {
    grader::logging::init();
    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;
    let paths = EvalPaths::new(&repo_root);
    let config = resolve_config(
        &cli.config,
        &Overrides {
            fail_fast: cli.fail_fast,
        },
    )?;
    match cli.command {
        Command::List { file } => cli::list_problems(&file, &config),
        Command::Setup { file, id, workdir } => {
            cli::setup_problem(&paths, &file, &id, workdir, &config)
        }
        Command::Grade {
            file,
            id,
            workdir,
            transcript,
        } => cli::grade_problem(&paths, &file, &id, &workdir, &transcript, &config),
        Command::Check {
            file,
            id,
            transcript,
        } => cli::check_problem_file(&file, &id, &transcript, &config),
        Command::Report { namespace } => cli::report_namespace(&paths, &namespace),
    }
}
