//! Tree-walking evaluator for benchmark fragments.
//!
//! The same evaluator runs setup fragments, directive text, submitted code and
//! grading fragments. It differs only in whether a collector stack is present:
//! with one, `assert` and `testset` record into it; without one, a failing
//! assertion is an ordinary runtime error.

mod builtins;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use crate::core::ast::{BinaryOp, Expr, Stmt, UnaryOp};
use crate::core::collector::{Capture, Collector, FailFast, Failure};
use crate::core::diff::{DiffComparator, UnifiedDiff};
use crate::core::value::Value;
use crate::io::config::GraderConfig;
use crate::io::context::ContextError;
use crate::io::privilege::{NativeDropper, PrivilegeDropper};

pub type Scope = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    FailFast(#[from] FailFast),
}

fn runtime(message: impl fmt::Display) -> EvalError {
    EvalError::Runtime(anyhow!("{message}"))
}

/// Configuration and collaborators shared by every evaluation in a namespace.
#[derive(Clone)]
pub struct Host {
    pub config: GraderConfig,
    pub dropper: Arc<dyn PrivilegeDropper>,
    pub diff: Arc<dyn DiffComparator>,
}

impl Host {
    pub fn new(config: GraderConfig) -> Self {
        Self {
            config,
            dropper: Arc::new(NativeDropper),
            diff: Arc::new(UnifiedDiff),
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new(GraderConfig::default())
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub struct Interpreter<'h> {
    host: &'h Host,
    answer: Value,
    collectors: Vec<Collector>,
}

impl<'h> Interpreter<'h> {
    /// An evaluator without a collector, for setup code and submitted programs.
    pub fn new(host: &'h Host) -> Self {
        Self {
            host,
            answer: Value::Nothing,
            collectors: Vec::new(),
        }
    }

    /// An evaluator for a grading fragment, recording assertions into `root`.
    pub fn grading(host: &'h Host, answer: Value, root: Collector) -> Self {
        Self {
            host,
            answer,
            collectors: vec![root],
        }
    }

    pub fn host(&self) -> &'h Host {
        self.host
    }

    /// The root collector, once evaluation is finished.
    pub fn into_collector(mut self) -> Option<Collector> {
        self.collectors.truncate(1);
        self.collectors.pop()
    }

    /// Record a capture at the innermost collector. No-op without a collector.
    pub fn record(&mut self, capture: &Capture) -> Result<(), FailFast> {
        match self.collectors.last_mut() {
            Some(collector) => collector.record(capture),
            None => Ok(()),
        }
    }

    /// Run statements in order; the value of the last one is the result.
    pub fn exec_block(&mut self, stmts: &[Stmt], scope: &mut Scope) -> Result<Value, EvalError> {
        let mut last = Value::Nothing;
        for stmt in stmts {
            last = self.exec_stmt(stmt, scope)?;
        }
        Ok(last)
    }

    pub fn exec_stmt(&mut self, stmt: &Stmt, scope: &mut Scope) -> Result<Value, EvalError> {
        match stmt {
            Stmt::Assign { name, value } => {
                let value = self.eval(value, scope)?;
                scope.insert(name.clone(), value.clone());
                Ok(value)
            }
            Stmt::Metadata(_) => Err(runtime("metadata is only allowed at the top level")),
            Stmt::Expr(expr) => self.eval(expr, scope),
        }
    }

    pub fn eval(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Value, EvalError> {
        match expr {
            Expr::Nothing => Ok(Value::Nothing),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Float(value) => Ok(Value::Float(*value)),
            Expr::Str(value) => Ok(Value::Str(value.clone())),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Ok(Value::List(values))
            }
            Expr::Record(fields) => {
                let mut values = BTreeMap::new();
                for (key, value) in fields {
                    let value = self.eval(value, scope)?;
                    values.insert(key.clone(), value);
                }
                Ok(Value::Record(values))
            }
            Expr::Var(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| runtime(format!("undefined variable '{name}'"))),
            Expr::Answer => Ok(self.answer.clone()),
            Expr::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scope)?);
                }
                builtins::call(self, name, values)
            }
            Expr::Directive(call) => Err(runtime(format!(
                "{} directive can only appear once, as the interaction point",
                call.kind.as_str()
            ))),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, scope)?;
                unary(*op, value)
            }
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    let left = expect_bool(self.eval(lhs, scope)?, op.symbol())?;
                    if left == (*op == BinaryOp::Or) {
                        return Ok(Value::Bool(left));
                    }
                    let right = expect_bool(self.eval(rhs, scope)?, op.symbol())?;
                    Ok(Value::Bool(right))
                }
                _ => {
                    let left = self.eval(lhs, scope)?;
                    let right = self.eval(rhs, scope)?;
                    binary(*op, &left, &right)
                }
            },
            Expr::Field { target, name } => {
                let target = self.eval(target, scope)?;
                field(&target, name)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                index_value(&target, &index)
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if expect_bool(self.eval(cond, scope)?, "if")? {
                    self.exec_block(then, scope)
                } else {
                    self.exec_block(otherwise, scope)
                }
            }
            Expr::Assert(inner) => self.assert(inner, scope),
            Expr::TestSet { name, body } => self.testset(name, body, scope),
        }
    }

    fn assert(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Value, EvalError> {
        let capture = match self.check(expr, scope) {
            Ok(capture) => capture,
            Err(EvalError::Runtime(err)) => Capture::Error(Failure {
                expr: expr.to_string(),
                detail: format!("{err:#}"),
            }),
            Err(other) => return Err(other),
        };
        if self.collectors.is_empty() {
            return match capture {
                Capture::Pass => Ok(Value::Capture(capture)),
                failed => Err(runtime(failed)),
            };
        }
        self.record(&capture)?;
        Ok(Value::Capture(capture))
    }

    /// Evaluate an assertion, quoting operands of a failed comparison.
    fn check(&mut self, expr: &Expr, scope: &mut Scope) -> Result<Capture, EvalError> {
        if let Expr::Binary { op, lhs, rhs } = expr
            && op.is_comparison()
        {
            let left = self.eval(lhs, scope)?;
            let right = self.eval(rhs, scope)?;
            let passed = expect_bool(binary(*op, &left, &right)?, op.symbol())?;
            if passed {
                return Ok(Capture::Pass);
            }
            return Ok(Capture::Fail(Failure {
                expr: expr.to_string(),
                detail: format!("Evaluated: {} {} {}", left.repr(), op.symbol(), right.repr()),
            }));
        }
        match self.eval(expr, scope)? {
            Value::Bool(true) => Ok(Capture::Pass),
            Value::Bool(false) => Ok(Capture::Fail(Failure {
                expr: expr.to_string(),
                detail: "Evaluated: false".to_string(),
            })),
            other => Ok(Capture::Error(Failure {
                expr: expr.to_string(),
                detail: format!(
                    "Expression evaluated to non-boolean value of type {}: {}",
                    other.type_name(),
                    other.repr()
                ),
            })),
        }
    }

    fn testset(&mut self, name: &str, body: &[Stmt], scope: &Scope) -> Result<Value, EvalError> {
        let Some(parent) = self.collectors.last() else {
            // Outside grading a testset is just a block.
            let mut inner = scope.clone();
            self.exec_block(body, &mut inner)?;
            return Ok(Value::Bool(true));
        };
        let child = parent.child(name);
        self.collectors.push(child);

        let mut inner = scope.clone();
        let mut aborted = None;
        for stmt in body {
            match self.exec_stmt(stmt, &mut inner) {
                Ok(_) => {}
                Err(EvalError::Runtime(err)) => {
                    let capture = Capture::Error(Failure {
                        expr: stmt.to_string(),
                        detail: format!("{err:#}"),
                    });
                    if let Err(fail_fast) = self.record(&capture) {
                        aborted = Some(EvalError::FailFast(fail_fast));
                    }
                    break;
                }
                Err(other) => {
                    aborted = Some(other);
                    break;
                }
            }
        }

        let Some(child) = self.collectors.pop() else {
            return Err(runtime("collector stack underflow"));
        };
        let passed = !child.has_failures();
        let nested = match self.collectors.last_mut() {
            Some(parent) => parent.push_nested(child),
            None => Ok(()),
        };
        if let Some(err) = aborted {
            return Err(err);
        }
        nested?;
        Ok(Value::Bool(passed))
    }
}

fn expect_bool(value: Value, context: &str) -> Result<bool, EvalError> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(runtime(format!(
            "{context} expects a boolean, got {} {}",
            other.type_name(),
            other.repr()
        ))),
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(flag)) => Ok(Value::Bool(!flag)),
        (UnaryOp::Neg, Value::Int(number)) => number
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| runtime("integer overflow")),
        (UnaryOp::Neg, Value::Float(number)) => Ok(Value::Float(-number)),
        (UnaryOp::Not, other) => Err(runtime(format!("cannot negate {}", other.type_name()))),
        (UnaryOp::Neg, other) => Err(runtime(format!("cannot negate {}", other.type_name()))),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let mismatch = || {
        runtime(format!(
            "unsupported operands for {}: {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    };
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.equals(right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.equals(right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(mismatch()),
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b).cloned().collect())),
            _ => arithmetic(op, left, right, i64::checked_add, |a, b| a + b).ok_or_else(mismatch)?,
        },
        BinaryOp::Sub => {
            arithmetic(op, left, right, i64::checked_sub, |a, b| a - b).ok_or_else(mismatch)?
        }
        BinaryOp::Mul => {
            arithmetic(op, left, right, i64::checked_mul, |a, b| a * b).ok_or_else(mismatch)?
        }
        BinaryOp::Div => {
            let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                return Err(mismatch());
            };
            if b == 0.0 {
                return Err(runtime("division by zero"));
            }
            Ok(Value::Float(a / b))
        }
        BinaryOp::Rem => {
            if matches!(right, Value::Int(0)) {
                return Err(runtime("division by zero"));
            }
            arithmetic(op, left, right, i64::checked_rem, |a, b| a % b).ok_or_else(mismatch)?
        }
        BinaryOp::And | BinaryOp::Or => Err(mismatch()),
    }
}

/// Integer arithmetic when both sides are integers, float otherwise.
/// `None` when either side is not a number.
fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Option<Result<Value, EvalError>> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return Some(
            int(*a, *b)
                .map(Value::Int)
                .ok_or_else(|| runtime(format!("integer overflow in {}", op.symbol()))),
        );
    }
    let (a, b) = (left.as_f64()?, right.as_f64()?);
    Some(Ok(Value::Float(float(a, b))))
}

fn field(target: &Value, name: &str) -> Result<Value, EvalError> {
    match target {
        Value::Record(fields) => fields
            .get(name)
            .cloned()
            .ok_or_else(|| runtime(format!("record has no field '{name}'"))),
        Value::Code(code) => match name {
            "source" => Ok(Value::Str(code.source.clone())),
            "path" => Ok(Value::Str(code.path.display().to_string())),
            _ => Err(runtime(format!("code answer has no field '{name}'"))),
        },
        other => Err(runtime(format!(
            "cannot access field '{name}' on {}",
            other.type_name()
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, EvalError> {
    match (target, index) {
        (Value::List(items), Value::Int(position)) => usize::try_from(*position)
            .ok()
            .and_then(|position| items.get(position))
            .cloned()
            .ok_or_else(|| {
                runtime(format!(
                    "index {position} out of bounds for list of length {}",
                    items.len()
                ))
            }),
        (Value::Str(text), Value::Int(position)) => usize::try_from(*position)
            .ok()
            .and_then(|position| text.chars().nth(position))
            .map(|ch| Value::Str(ch.to_string()))
            .ok_or_else(|| runtime(format!("index {position} out of bounds for string"))),
        (Value::Record(fields), Value::Str(key)) => fields
            .get(key)
            .cloned()
            .ok_or_else(|| runtime(format!("record has no field '{key}'"))),
        (target, index) => Err(runtime(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_program;

    fn eval_source(source: &str) -> Result<Value, EvalError> {
        let host = Host::default();
        let program = parse_program(source).expect("parse");
        let mut interp = Interpreter::new(&host);
        interp.exec_block(&program, &mut Scope::new())
    }

    fn eval_ok(source: &str) -> Value {
        eval_source(source).expect("eval")
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(eval_ok("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval_ok("7 / 2"), Value::Float(3.5));
        assert_eq!(eval_ok("7 % 3"), Value::Int(1));
        assert_eq!(eval_ok("1 + 0.5"), Value::Float(1.5));
        assert_eq!(eval_ok("4 == 4.0"), Value::Bool(true));
        assert_eq!(eval_ok("\"4\" == 4"), Value::Bool(false));
        assert_eq!(eval_ok("\"a\" < \"b\""), Value::Bool(true));
        assert_eq!(eval_ok("\"ab\" + \"c\""), Value::str("abc"));
        assert_eq!(eval_ok("[1] + [2]"), Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn bindings_fields_and_indexing() {
        assert_eq!(eval_ok("x = { a = [10, 20] }\nx.a[1]"), Value::Int(20));
        assert_eq!(eval_ok("r = { k = 1 }; r[\"k\"]"), Value::Int(1));
        assert_eq!(eval_ok("\"abc\"[2]"), Value::str("c"));
    }

    #[test]
    fn conditionals_require_booleans() {
        assert_eq!(eval_ok("if 1 < 2 { \"yes\" } else { \"no\" }"), Value::str("yes"));
        assert_eq!(eval_ok("if false { 1 }"), Value::Nothing);
        let err = eval_source("if 1 { 2 }").expect_err("non-bool");
        assert!(err.to_string().contains("expects a boolean"));
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(eval_ok("false && undefined_name"), Value::Bool(false));
        assert_eq!(eval_ok("true || undefined_name"), Value::Bool(true));
        assert!(eval_source("true && undefined_name").is_err());
    }

    #[test]
    fn runtime_errors_are_reported() {
        let err = eval_source("y + 1").expect_err("undefined");
        assert!(err.to_string().contains("undefined variable 'y'"));
        let err = eval_source("1 / 0").expect_err("div");
        assert!(err.to_string().contains("division by zero"));
        let err = eval_source("9223372036854775807 + 1").expect_err("overflow");
        assert!(err.to_string().contains("overflow"));
        let err = eval_source("[1][3]").expect_err("bounds");
        assert!(err.to_string().contains("out of bounds"));
    }

    #[test]
    fn failing_assert_outside_grading_is_an_error() {
        assert!(matches!(eval_ok("assert 1 == 1"), Value::Capture(Capture::Pass)));
        let err = eval_source("assert 1 == 2").expect_err("assert");
        assert!(err.to_string().contains("Evaluated: 1 == 2"));
    }

    #[test]
    fn grading_records_assertions_and_testsets() {
        let host = Host::default();
        let program = parse_program(
            "assert answer == 4\ntestset \"inner\" {\n  assert answer > 10\n  assert len(\"ab\") == 2\n}",
        )
        .expect("parse");
        let mut interp = Interpreter::grading(&host, Value::Int(4), Collector::new("p", false));
        let last = interp
            .exec_block(&program, &mut Scope::new())
            .expect("eval");
        assert_eq!(last, Value::Bool(false));
        let collector = interp.into_collector().expect("collector");
        let counts = collector.counts();
        assert_eq!(counts.passes, 2);
        assert_eq!(counts.fails, 1);
        let report = collector.report().expect("report");
        assert!(report.contains("inner: 1 passed, 1 failed"));
        assert!(report.contains("Evaluated: 4 > 10"));
    }

    #[test]
    fn assertion_errors_are_captured_not_raised() {
        let host = Host::default();
        let program = parse_program("assert missing > 1\nassert true").expect("parse");
        let mut interp = Interpreter::grading(&host, Value::Nothing, Collector::new("p", false));
        interp
            .exec_block(&program, &mut Scope::new())
            .expect("eval");
        let collector = interp.into_collector().expect("collector");
        assert_eq!(collector.counts().errors, 1);
        assert_eq!(collector.counts().passes, 1);
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let host = Host::default();
        let program = parse_program("assert false\nerror(\"unreachable\")").expect("parse");
        let mut interp = Interpreter::grading(&host, Value::Nothing, Collector::new("p", true));
        let err = interp
            .exec_block(&program, &mut Scope::new())
            .expect_err("fail fast");
        assert!(matches!(err, EvalError::FailFast(_)));
    }
}
