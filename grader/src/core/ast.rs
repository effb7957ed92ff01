//! Syntax tree for benchmark bodies.
//!
//! The tree is plain data: the parser builds it, the splitter rewrites it once
//! at registration, and the interpreter walks it. `Display` renders a node back
//! to source form so assertion diagnostics can quote the failing expression.

use std::fmt;

/// A benchmark body as declared by its author.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A single non-block expression (no setup phase).
    Expr(Expr),
    /// An ordered sequence of top-level statements.
    Block(Vec<Stmt>),
}

impl Body {
    /// Build a body from parsed statements: a lone expression statement is a
    /// single-expression body, anything else is a block.
    pub fn from_statements(mut stmts: Vec<Stmt>) -> Self {
        if stmts.len() == 1 && matches!(stmts[0], Stmt::Expr(_)) {
            if let Some(Stmt::Expr(expr)) = stmts.pop() {
                return Body::Expr(expr);
            }
        }
        Body::Block(stmts)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name = value`
    Assign { name: String, value: Expr },
    /// `metadata { key = literal, ... }` (top level only).
    Metadata(Vec<(String, Expr)>),
    Expr(Expr),
}

/// The five interaction-point kinds, spelled by their capitalised names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Value,
    Directory,
    CodeFile,
    Commit,
    MarkdownFile,
}

impl DirectiveKind {
    pub const ALL: [DirectiveKind; 5] = [
        DirectiveKind::Value,
        DirectiveKind::Directory,
        DirectiveKind::CodeFile,
        DirectiveKind::Commit,
        DirectiveKind::MarkdownFile,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveKind::Value => "Value",
            DirectiveKind::Directory => "Directory",
            DirectiveKind::CodeFile => "CodeFile",
            DirectiveKind::Commit => "Commit",
            DirectiveKind::MarkdownFile => "MarkdownFile",
        }
    }
}

/// A directive call as it appears in source, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveCall {
    pub kind: DirectiveKind,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 5,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 3
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    Var(String),
    /// Reference to the extracted answer; produced by the splitter.
    Answer,
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Directive(DirectiveCall),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Field {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    Assert(Box<Expr>),
    TestSet {
        name: String,
        body: Vec<Stmt>,
    },
}

impl Expr {
    /// True for expressions made only of literals (valid metadata values).
    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Nothing | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => true,
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => matches!(**expr, Expr::Int(_) | Expr::Float(_)),
            Expr::List(items) => items.iter().all(Expr::is_literal),
            Expr::Record(fields) => fields.iter().all(|(_, value)| value.is_literal()),
            _ => false,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        match self {
            Expr::Nothing => write!(f, "nothing"),
            Expr::Bool(value) => write!(f, "{value}"),
            Expr::Int(value) => write!(f, "{value}"),
            Expr::Float(value) => write!(f, "{value:?}"),
            Expr::Str(value) => write!(f, "{value:?}"),
            Expr::List(items) => {
                write!(f, "[")?;
                write_comma_separated(f, items)?;
                write!(f, "]")
            }
            Expr::Record(fields) => write_fields(f, fields),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Answer => write!(f, "answer"),
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                write_comma_separated(f, args)?;
                write!(f, ")")
            }
            Expr::Directive(call) => {
                write!(f, "{}(", call.kind.as_str())?;
                write_comma_separated(f, &call.args)?;
                write!(f, ")")
            }
            Expr::Unary { op, expr } => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                write!(f, "{symbol}")?;
                expr.fmt_prec(f, 6)
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                if prec < parent {
                    write!(f, "(")?;
                }
                lhs.fmt_prec(f, prec)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_prec(f, prec + 1)?;
                if prec < parent {
                    write!(f, ")")?;
                }
                Ok(())
            }
            Expr::Field { target, name } => {
                target.fmt_prec(f, 7)?;
                write!(f, ".{name}")
            }
            Expr::Index { target, index } => {
                target.fmt_prec(f, 7)?;
                write!(f, "[{index}]")
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                write!(f, "if {cond} ")?;
                write_block(f, then)?;
                if !otherwise.is_empty() {
                    write!(f, " else ")?;
                    write_block(f, otherwise)?;
                }
                Ok(())
            }
            Expr::Assert(expr) => write!(f, "assert {expr}"),
            Expr::TestSet { name, body } => {
                write!(f, "testset {name:?} ")?;
                write_block(f, body)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { name, value } => write!(f, "{name} = {value}"),
            Stmt::Metadata(fields) => {
                write!(f, "metadata ")?;
                write_fields(f, fields)
            }
            Stmt::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

fn write_comma_separated(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[(String, Expr)]) -> fmt::Result {
    if fields.is_empty() {
        return write!(f, "{{}}");
    }
    write!(f, "{{ ")?;
    for (index, (key, value)) in fields.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{key} = {value}")?;
    }
    write!(f, " }}")
}

fn write_block(f: &mut fmt::Formatter<'_>, stmts: &[Stmt]) -> fmt::Result {
    write!(f, "{{ ")?;
    for (index, stmt) in stmts.iter().enumerate() {
        if index > 0 {
            write!(f, "; ")?;
        }
        write!(f, "{stmt}")?;
    }
    write!(f, " }}")
}
