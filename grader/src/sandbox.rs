//! Runs a grading fragment and captures its assertions.
//!
//! Assertion failures and runtime errors never escape: they are recorded in
//! the collector, and any recorded failure forces the outcome to `false`.
//! Context errors are not grading conditions and propagate to the caller.

use tracing::{debug, instrument};

use crate::core::ast::Stmt;
use crate::core::collector::{Capture, Collector, Counts, Failure};
use crate::core::value::Value;
use crate::interp::{EvalError, Host, Interpreter, Scope};
use crate::io::context::ContextError;

/// The fragment's value (or `false` after failures) plus the failure report.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutcome {
    pub outcome: Value,
    pub diagnostics: Option<String>,
    pub counts: Counts,
}

#[instrument(skip_all, fields(collector = name, statements = fragment.len()))]
pub fn run(
    name: &str,
    fragment: &[Stmt],
    answer: Value,
    host: &Host,
) -> Result<SandboxOutcome, ContextError> {
    let root = Collector::new(name, host.config.fail_fast);
    let mut scope = Scope::from([("answer".to_string(), answer.clone())]);
    let mut interp = Interpreter::grading(host, answer, root);

    let mut outcome = Value::Nothing;
    for stmt in fragment {
        match interp.exec_stmt(stmt, &mut scope) {
            Ok(value) => outcome = value,
            Err(EvalError::Context(err)) => return Err(err),
            Err(EvalError::FailFast(signal)) => {
                debug!(collector = %signal.collector, "fail-fast triggered");
                break;
            }
            Err(EvalError::Runtime(err)) => {
                let capture = Capture::Error(Failure {
                    expr: stmt.to_string(),
                    detail: format!("{err:#}"),
                });
                // Evaluation stops here either way; fail-fast adds nothing.
                let _ = interp.record(&capture);
                break;
            }
        }
    }

    let collector = interp
        .into_collector()
        .unwrap_or_else(|| Collector::new(name, host.config.fail_fast));
    let counts = collector.counts();
    let diagnostics = collector.report();
    if diagnostics.is_some() {
        outcome = Value::Bool(false);
    }
    debug!(
        passes = counts.passes,
        fails = counts.fails,
        errors = counts.errors,
        "grading fragment finished"
    );
    Ok(SandboxOutcome {
        outcome,
        diagnostics,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_program;
    use crate::io::config::GraderConfig;

    fn run_source(source: &str, answer: Value, host: &Host) -> SandboxOutcome {
        let fragment = parse_program(source).expect("parse");
        run("p", &fragment, answer, host).expect("run")
    }

    #[test]
    fn assertion_free_fragment_returns_its_value() {
        let out = run_source("answer == 4", Value::Int(4), &Host::default());
        assert_eq!(out.outcome, Value::Bool(true));
        assert_eq!(out.diagnostics, None);

        let out = run_source("{ score = 0.5 }", Value::Nothing, &Host::default());
        assert!(matches!(out.outcome, Value::Record(_)));
    }

    #[test]
    fn failure_forces_false_and_reports_only_failures() {
        let out = run_source(
            "assert answer > 0\nassert answer == 5\ntrue",
            Value::Int(4),
            &Host::default(),
        );
        assert_eq!(out.outcome, Value::Bool(false));
        let diagnostics = out.diagnostics.expect("diagnostics");
        assert!(diagnostics.contains("answer == 5"));
        assert!(diagnostics.contains("Evaluated: 4 == 5"));
        assert!(!diagnostics.contains("answer > 0"));
        assert_eq!(out.counts.passes, 1);
    }

    #[test]
    fn runtime_error_is_recorded_and_stops_evaluation() {
        let out = run_source(
            "x = read_nothing()\nassert true",
            Value::Nothing,
            &Host::default(),
        );
        assert_eq!(out.outcome, Value::Bool(false));
        assert_eq!(out.counts.errors, 1);
        assert_eq!(out.counts.passes, 0);
        assert!(
            out.diagnostics
                .expect("diagnostics")
                .contains("unknown function 'read_nothing'")
        );
    }

    #[test]
    fn fail_fast_skips_remaining_statements() {
        let host = Host::new(GraderConfig {
            fail_fast: true,
            ..GraderConfig::default()
        });
        let out = run_source("assert false\nassert false", Value::Nothing, &host);
        assert_eq!(out.counts.fails, 1);
        assert_eq!(out.outcome, Value::Bool(false));
    }

    #[test]
    fn context_errors_propagate() {
        if std::env::var_os(crate::io::context::WORKSPACE_ENV).is_some() {
            return;
        }
        let fragment = parse_program("assert file_exists(\"x\")").expect("parse");
        let err = run("p", &fragment, Value::Nothing, &Host::default()).expect_err("context");
        assert!(matches!(err, ContextError::NoActiveWorkspace));
    }
}
