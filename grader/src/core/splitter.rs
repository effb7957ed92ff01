//! Splits a benchmark body around its interaction point.
//!
//! The first directive found depth-first (pre-order, left to right) is
//! replaced by [`Expr::Answer`]. Top-level statements before the one that
//! contained it form the setup fragment; that statement and everything after
//! it form the grading fragment.

use std::collections::BTreeMap;

use crate::core::ast::{Body, DirectiveCall, Expr, Stmt};
use crate::core::value::Value;

/// Keys that listings reserve for themselves.
const RESERVED_METADATA_KEYS: &[&str] = &["id"];

#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub setup: Vec<Stmt>,
    pub directive: DirectiveCall,
    pub grading: Vec<Stmt>,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("no prompt directive found")]
    NoDirective,
    #[error("found {count} prompt directives; exactly one is allowed")]
    MultipleDirectives { count: usize },
    #[error("more than one metadata block")]
    DuplicateMetadata,
    #[error("malformed metadata entry '{key}': {reason}")]
    MalformedMetadata { key: String, reason: String },
}

pub fn split(body: Body) -> Result<Split, SplitError> {
    let (mut stmts, metadata) = match body {
        Body::Expr(expr) => (vec![Stmt::Expr(expr)], BTreeMap::new()),
        Body::Block(stmts) => take_metadata(stmts)?,
    };

    let count: usize = stmts.iter_mut().map(count_in_stmt).sum();
    match count {
        0 => return Err(SplitError::NoDirective),
        1 => {}
        count => return Err(SplitError::MultipleDirectives { count }),
    }

    let mut found = None;
    for (index, stmt) in stmts.iter_mut().enumerate() {
        if let Some(call) = stmt_exprs_mut(stmt).into_iter().find_map(take_first) {
            found = Some((index, call));
            break;
        }
    }
    let Some((index, directive)) = found else {
        return Err(SplitError::NoDirective);
    };

    let grading = stmts.split_off(index);
    Ok(Split {
        setup: stmts,
        directive,
        grading,
        metadata,
    })
}

fn take_metadata(
    stmts: Vec<Stmt>,
) -> Result<(Vec<Stmt>, BTreeMap<String, Value>), SplitError> {
    let mut metadata = None;
    let mut rest = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::Metadata(fields) => {
                if metadata.is_some() {
                    return Err(SplitError::DuplicateMetadata);
                }
                metadata = Some(metadata_values(fields)?);
            }
            other => rest.push(other),
        }
    }
    Ok((rest, metadata.unwrap_or_default()))
}

fn metadata_values(fields: Vec<(String, Expr)>) -> Result<BTreeMap<String, Value>, SplitError> {
    let mut values = BTreeMap::new();
    for (key, expr) in fields {
        if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
            return Err(SplitError::MalformedMetadata {
                key,
                reason: "reserved key".to_string(),
            });
        }
        let Some(value) = Value::from_literal(&expr) else {
            return Err(SplitError::MalformedMetadata {
                key,
                reason: format!("expected a literal, found `{expr}`"),
            });
        };
        values.insert(key, value);
    }
    Ok(values)
}

fn take_first(expr: &mut Expr) -> Option<DirectiveCall> {
    if matches!(expr, Expr::Directive(_))
        && let Expr::Directive(call) = std::mem::replace(expr, Expr::Answer)
    {
        return Some(call);
    }
    children_mut(expr).into_iter().find_map(take_first)
}

fn count_in_stmt(stmt: &mut Stmt) -> usize {
    stmt_exprs_mut(stmt).into_iter().map(count_in_expr).sum()
}

fn count_in_expr(expr: &mut Expr) -> usize {
    let own = usize::from(matches!(expr, Expr::Directive(_)));
    own + children_mut(expr)
        .into_iter()
        .map(count_in_expr)
        .sum::<usize>()
}

fn stmt_exprs_mut(stmt: &mut Stmt) -> Vec<&mut Expr> {
    match stmt {
        Stmt::Assign { value, .. } => vec![value],
        Stmt::Metadata(fields) => fields.iter_mut().map(|(_, value)| value).collect(),
        Stmt::Expr(expr) => vec![expr],
    }
}

/// Direct children in evaluation order.
fn children_mut(expr: &mut Expr) -> Vec<&mut Expr> {
    match expr {
        Expr::List(items) | Expr::Call { args: items, .. } => items.iter_mut().collect(),
        Expr::Directive(call) => call.args.iter_mut().collect(),
        Expr::Record(fields) => fields.iter_mut().map(|(_, value)| value).collect(),
        Expr::Unary { expr, .. } | Expr::Assert(expr) => vec![expr.as_mut()],
        Expr::Binary { lhs, rhs, .. } => vec![lhs.as_mut(), rhs.as_mut()],
        Expr::Field { target, .. } => vec![target.as_mut()],
        Expr::Index { target, index } => vec![target.as_mut(), index.as_mut()],
        Expr::If {
            cond,
            then,
            otherwise,
        } => {
            let mut children = vec![cond.as_mut()];
            children.extend(
                then.iter_mut()
                    .chain(otherwise.iter_mut())
                    .flat_map(stmt_exprs_mut),
            );
            children
        }
        Expr::TestSet { body, .. } => body.iter_mut().flat_map(stmt_exprs_mut).collect(),
        Expr::Nothing
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Var(_)
        | Expr::Answer => Vec::new(),
    }
}
