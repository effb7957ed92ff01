//! Side-effecting helpers: workspace context, files, processes, git, templates.

pub mod benchmark_file;
pub mod config;
pub mod context;
pub mod git;
pub mod privilege;
pub mod process;
pub mod prompt;
pub mod scratch;
