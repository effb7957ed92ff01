//! Benchmark definition and grading engine.
//!
//! A benchmark problem is written as one body in a small expression language:
//! setup code, exactly one prompt directive (the point where the agent is
//! asked for an answer), and grading code that inspects that answer. The crate
//! turns each body into a `setup`/`grade` pair:
//!
//! - **[`core`]**: pure logic. The language front end, the body splitter, the
//!   assertion collector, score normalization and diff comparison.
//! - **[`io`]**: side effects. The workspace context, configuration, child
//!   processes, git, prompt templates and benchmark files.
//! - **[`interp`]** evaluates fragments; **[`sandbox`]** runs grading
//!   fragments with assertions captured; **[`directive`]** renders
//!   instructions and extracts answers.
//! - **[`registry`]** exposes [`Namespace::setup_problem`],
//!   [`Namespace::grade`] and [`Namespace::list_problems`].
//!
//! ```
//! use grader::Namespace;
//!
//! let ns = Namespace::builder("arith")?
//!     .problem("add", r#"Value("What is 2+2?") == 4"#)?
//!     .build();
//! let dir = tempfile::tempdir()?;
//! let record = ns.grade(dir.path(), "<answer>4</answer>", "arith-add")?;
//! assert_eq!(record.score, 1.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod core;
pub mod directive;
pub mod error;
pub mod interp;
pub mod io;
pub mod logging;
pub mod problem;
pub mod registry;
pub mod sandbox;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::score::ScoreRecord;
pub use error::{DefinitionError, Error};
pub use problem::Problem;
pub use registry::Namespace;
