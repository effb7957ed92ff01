//! Runtime values produced by benchmark code.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::ast::{Expr, Stmt, UnaryOp};
use crate::core::collector::Capture;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    /// A parsed source-file answer.
    Code(Arc<CodeAnswer>),
    /// The result of a single `assert`.
    Capture(Capture),
}

/// Source submitted through a code-file directive, with its top-level items.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAnswer {
    pub path: PathBuf,
    pub source: String,
    pub program: Vec<Stmt>,
}

impl CodeAnswer {
    /// Names bound at the top level of the submitted program, in order.
    pub fn definitions(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for stmt in &self.program {
            if let Stmt::Assign { name, .. } = stmt
                && !names.contains(name)
            {
                names.push(name.clone());
            }
        }
        names
    }
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Code(_) => "code",
            Value::Capture(_) => "capture",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Structural equality where integers and floats compare numerically.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (a @ (Value::Int(_) | Value::Float(_)), b @ (Value::Int(_) | Value::Float(_))) => {
                a.as_f64() == b.as_f64()
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            (a, b) => a == b,
        }
    }

    /// Convert a literal expression (see [`Expr::is_literal`]) into a value.
    pub fn from_literal(expr: &Expr) -> Option<Value> {
        let value = match expr {
            Expr::Nothing => Value::Nothing,
            Expr::Bool(value) => Value::Bool(*value),
            Expr::Int(value) => Value::Int(*value),
            Expr::Float(value) => Value::Float(*value),
            Expr::Str(value) => Value::Str(value.clone()),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => match **expr {
                Expr::Int(value) => Value::Int(value.checked_neg()?),
                Expr::Float(value) => Value::Float(-value),
                _ => return None,
            },
            Expr::List(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_literal)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Expr::Record(fields) => Value::Record(
                fields
                    .iter()
                    .map(|(key, value)| Some((key.clone(), Value::from_literal(value)?)))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
            _ => return None,
        };
        Some(value)
    }

    /// JSON form used in score-record metadata and listings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nothing => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Int(value) => serde_json::Value::from(*value),
            Value::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(value) => serde_json::Value::String(value.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Code(code) => serde_json::Value::String(code.source.clone()),
            Value::Capture(capture) => serde_json::Value::String(capture.to_string()),
        }
    }

    /// Source-like rendering: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(value) => format!("{value:?}"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "nothing"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:?}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (index, (key, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {key} = {}", value.repr())?;
                }
                write!(f, " }}")
            }
            Value::Code(code) => write!(f, "<code {}>", code.path.display()),
            Value::Capture(capture) => write!(f, "{capture}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_literal;

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert!(Value::Int(4).equals(&Value::Float(4.0)));
        assert!(!Value::Int(4).equals(&Value::str("4")));
        assert!(
            Value::List(vec![Value::Int(1), Value::Float(2.0)])
                .equals(&Value::List(vec![Value::Float(1.0), Value::Int(2)]))
        );
    }

    #[test]
    fn converts_literals() {
        let expr = parse_literal("{ a = [1, -2], b = \"x\" }").expect("literal");
        let value = Value::from_literal(&expr).expect("value");
        let Value::Record(fields) = &value else {
            panic!("expected record");
        };
        assert_eq!(fields["a"], Value::List(vec![Value::Int(1), Value::Int(-2)]));
        assert_eq!(
            value.to_json(),
            serde_json::json!({ "a": [1, -2], "b": "x" })
        );
    }

    #[test]
    fn renders_strings_quoted_only_in_repr() {
        let value = Value::str("hi");
        assert_eq!(value.to_string(), "hi");
        assert_eq!(value.repr(), "\"hi\"");
        assert_eq!(
            Value::List(vec![Value::str("a"), Value::Int(1)]).to_string(),
            "[\"a\", 1]"
        );
    }

    #[test]
    fn code_answer_lists_unique_definitions() {
        let program = crate::core::parser::parse_program("a = 1\nb = a + 1\na = 3\nprint(a)")
            .expect("parse");
        let code = CodeAnswer {
            path: PathBuf::from("answer.jl"),
            source: String::new(),
            program,
        };
        assert_eq!(code.definitions(), vec!["a".to_string(), "b".to_string()]);
    }
}
