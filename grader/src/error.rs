//! Error taxonomy at the library boundary.

use crate::core::lexer::SyntaxError;
use crate::core::score::UnrecognizedOutcome;
use crate::core::splitter::SplitError;
use crate::io::context::ContextError;

/// A benchmark that cannot be registered. Fatal to loading its namespace.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("problem '{problem}': no prompt directive found")]
    NoDirective { problem: String },

    #[error("problem '{problem}': found {count} prompt directives, exactly one is allowed")]
    MultipleDirectives { problem: String, count: usize },

    #[error("problem '{problem}': more than one metadata block")]
    DuplicateMetadata { problem: String },

    #[error("problem '{problem}': malformed metadata entry '{key}': {reason}")]
    MalformedMetadata {
        problem: String,
        key: String,
        reason: String,
    },

    #[error("problem '{problem}': syntax error at {source}")]
    Parse {
        problem: String,
        #[source]
        source: SyntaxError,
    },

    #[error("problem '{problem}': invalid {kind} directive: {reason}")]
    InvalidDirective {
        problem: String,
        kind: &'static str,
        reason: String,
    },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("duplicate problem '{problem}' in namespace '{namespace}'")]
    DuplicateProblem { namespace: String, problem: String },
}

impl DefinitionError {
    pub(crate) fn from_split(problem: &str, err: SplitError) -> Self {
        let problem = problem.to_string();
        match err {
            SplitError::NoDirective => Self::NoDirective { problem },
            SplitError::MultipleDirectives { count } => Self::MultipleDirectives { problem, count },
            SplitError::DuplicateMetadata => Self::DuplicateMetadata { problem },
            SplitError::MalformedMetadata { key, reason } => Self::MalformedMetadata {
                problem,
                key,
                reason,
            },
        }
    }
}

/// Failures of `setup_problem`/`grade` that are not grading conditions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("problem '{problem}': {source}")]
    UnrecognizedOutcome {
        problem: String,
        #[source]
        source: UnrecognizedOutcome,
    },

    #[error("setup of problem '{problem}' failed: {message}")]
    Setup { problem: String, message: String },
}
