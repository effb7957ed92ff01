//! A compiled benchmark problem: setup fragment, directive, grading fragment.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::core::ast::{Body, Stmt};
use crate::core::parser::parse_body;
use crate::core::score::{ScoreRecord, normalize};
use crate::core::splitter::split;
use crate::core::value::Value;
use crate::directive::Directive;
use crate::error::{DefinitionError, Error};
use crate::interp::{EvalError, Host, Interpreter, Scope};
use crate::sandbox;

/// Immutable after registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    name: String,
    setup: Vec<Stmt>,
    directive: Directive,
    grading: Vec<Stmt>,
    metadata: BTreeMap<String, Value>,
}

impl Problem {
    /// Parse and split `source` into a problem called `name`.
    pub fn compile(name: &str, source: &str) -> Result<Self, DefinitionError> {
        validate_name(name)?;
        let body = parse_body(source).map_err(|source| DefinitionError::Parse {
            problem: name.to_string(),
            source,
        })?;
        Self::from_body(name, body)
    }

    pub fn from_body(name: &str, body: Body) -> Result<Self, DefinitionError> {
        validate_name(name)?;
        let split = split(body).map_err(|err| DefinitionError::from_split(name, err))?;
        let kind = split.directive.kind;
        let directive =
            Directive::try_from(split.directive).map_err(|reason| DefinitionError::InvalidDirective {
                problem: name.to_string(),
                kind: kind.as_str(),
                reason,
            })?;
        debug!(
            problem = name,
            kind = kind.as_str(),
            setup = split.setup.len(),
            grading = split.grading.len(),
            "compiled problem"
        );
        Ok(Self {
            name: name.to_string(),
            setup: split.setup,
            directive,
            grading: split.grading,
            metadata: split.metadata,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn setup_fragment(&self) -> &[Stmt] {
        &self.setup
    }

    pub fn grading_fragment(&self) -> &[Stmt] {
        &self.grading
    }

    /// Run the setup fragment and render instructions. Expects the workspace
    /// context to be installed already.
    #[instrument(skip_all, fields(problem = %self.name))]
    pub fn run_setup(&self, host: &Host, workspace: &Path) -> Result<String, Error> {
        let mut interp = Interpreter::new(host);
        let mut scope = Scope::new();
        interp
            .exec_block(&self.setup, &mut scope)
            .map_err(|err| self.setup_error(err))?;
        self.directive
            .render(&mut interp, &mut scope, workspace)
            .map_err(|err| self.setup_error(err))
    }

    /// Extract, run the grading fragment and normalize. Expects the workspace
    /// context to be installed already.
    #[instrument(skip_all, fields(problem = %self.name))]
    pub fn run_grade(
        &self,
        host: &Host,
        workspace: &Path,
        transcript: &str,
    ) -> Result<ScoreRecord, Error> {
        let answer = match self.directive.extract(workspace, transcript) {
            Ok(extracted) => extracted.into_value(),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "answer extraction failed");
                return Ok(ScoreRecord::zero_with_error(
                    &self.name,
                    format!("failed to extract answer: {err:#}"),
                ));
            }
        };

        let outcome = sandbox::run(&self.name, &self.grading, answer, host)?;
        let mut record =
            normalize(outcome.outcome, &self.name).map_err(|source| Error::UnrecognizedOutcome {
                problem: self.name.clone(),
                source,
            })?;
        if let Some(diagnostics) = outcome.diagnostics {
            record.insert_metadata("test_errors", serde_json::Value::String(diagnostics));
        }
        debug!(score = record.score, "graded");
        Ok(record)
    }

    fn setup_error(&self, err: EvalError) -> Error {
        match err {
            EvalError::Context(err) => Error::Context(err),
            other => Error::Setup {
                problem: self.name.clone(),
                message: format!("{other:#}"),
            },
        }
    }
}

/// Names use `[A-Za-z0-9_-]`.
pub fn validate_name(name: &str) -> Result<(), DefinitionError> {
    let invalid = |reason: &str| DefinitionError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("must be non-empty"));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(invalid("must use [A-Za-z0-9_-] only"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::DirectiveKind;

    #[test]
    fn compiles_a_value_problem() {
        let problem = Problem::compile("add", "Value(\"What is 2+2?\") == 4").expect("compile");
        assert_eq!(problem.name(), "add");
        assert_eq!(problem.directive().kind, DirectiveKind::Value);
        assert!(problem.setup_fragment().is_empty());
        assert_eq!(problem.grading_fragment().len(), 1);
    }

    #[test]
    fn definition_errors_name_the_problem() {
        let err = Problem::compile("p", "1 + 1").expect_err("no directive");
        assert!(matches!(err, DefinitionError::NoDirective { ref problem } if problem == "p"));
        assert!(err.to_string().contains("'p'"));

        let err = Problem::compile("p", "Value(").expect_err("syntax");
        assert!(matches!(err, DefinitionError::Parse { .. }));

        let err = Problem::compile("p", "CodeFile(\"x\", 1)").expect_err("directive");
        assert!(matches!(
            err,
            DefinitionError::InvalidDirective { kind: "CodeFile", .. }
        ));

        let err = Problem::compile("bad name", "Value(\"x\")").expect_err("name");
        assert!(matches!(err, DefinitionError::InvalidName { .. }));
    }

    #[test]
    fn setup_runtime_errors_are_setup_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let problem =
            Problem::compile("p", "x = error(\"broken setup\")\nValue(\"q\") == 1").expect("compile");
        let host = Host::default();
        let err = problem.run_setup(&host, temp.path()).expect_err("setup");
        assert!(matches!(err, Error::Setup { .. }));
        assert!(err.to_string().contains("broken setup"));
    }

    #[test]
    fn unscorable_outcome_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let problem = Problem::compile("p", "x = Value(\"name?\")").expect("compile");
        let host = Host::default();
        let err = problem
            .run_grade(&host, temp.path(), "<answer>Bob</answer>")
            .expect_err("string outcome");
        assert!(matches!(err, Error::UnrecognizedOutcome { .. }));
    }
}
