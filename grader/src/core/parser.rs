//! Recursive-descent parser for benchmark bodies.
//!
//! Grammar (informal):
//!
//! ```text
//! program   := sep* (stmt (sep+ stmt)*)? sep*
//! stmt      := "metadata" record | IDENT "=" expr | expr
//! expr      := "assert" expr | "testset" STRING block | binary
//! binary    := unary (OP unary)*            (precedence climbing)
//! unary     := ("!" | "-") unary | postfix
//! postfix   := primary ("." IDENT | "[" expr "]")*
//! primary   := literal | IDENT | IDENT "(" args ")" | "(" expr ")"
//!            | "[" args "]" | record | "if" expr block ("else" (if | block))?
//! ```

use crate::core::ast::{BinaryOp, Body, DirectiveCall, DirectiveKind, Expr, Stmt, UnaryOp};
use crate::core::lexer::{Pos, SyntaxError, Tok, Token, tokenize};

/// Deepest expression nesting accepted. Parsing, evaluation and drop all
/// recurse over the tree, so the bound keeps hostile answers off the stack.
pub const MAX_DEPTH: usize = 64;

const KEYWORDS: &[&str] = &[
    "true", "false", "nothing", "assert", "testset", "if", "else", "metadata",
];

/// Parse source into top-level statements.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let mut parser = Parser::new(tokenize(source)?);
    let stmts = parser.statements(true, &Tok::Eof)?;
    parser.expect(&Tok::Eof, "end of input")?;
    Ok(stmts)
}

/// Parse source into a [`Body`].
pub fn parse_body(source: &str) -> Result<Body, SyntaxError> {
    parse_program(source).map(Body::from_statements)
}

/// Parse `text` as a single literal expression (`4`, `-1.5`, `"s"`, `[1, 2]`,
/// `{ a = 1 }`, `true`, `nothing`). Returns `None` for anything else.
pub fn parse_literal(text: &str) -> Option<Expr> {
    let mut parser = Parser::new(tokenize(text).ok()?);
    parser.skip_separators();
    let expr = parser.expr().ok()?;
    parser.skip_separators();
    if parser.peek() != &Tok::Eof || !expr.is_literal() {
        return None;
    }
    Some(expr)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            depth: 0,
        }
    }

    /// Enter one level of nesting, failing past [`MAX_DEPTH`].
    fn deepen(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!(
                "expression nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        self.deepen()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.index.min(self.tokens.len() - 1)].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let index = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[index].tok
    }

    fn pos(&self) -> Pos {
        self.tokens[self.index.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        tok
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Tok::Ident(ident) if ident == name)
    }

    fn expect(&mut self, tok: &Tok, what: &str) -> Result<(), SyntaxError> {
        if self.check(tok) {
            self.advance();
            return Ok(());
        }
        Err(self.error(format!("expected {what}, found {}", describe(self.peek()))))
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.pos(), message)
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Tok::Newline | Tok::Semi) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Tok::Newline) {
            self.advance();
        }
    }

    fn statements(&mut self, top_level: bool, end: &Tok) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.check(end) || self.check(&Tok::Eof) {
                return Ok(stmts);
            }
            stmts.push(self.statement(top_level)?);
            if !matches!(self.peek(), Tok::Newline | Tok::Semi) && !self.check(end) {
                return Err(self.error(format!(
                    "expected newline or ';' after statement, found {}",
                    describe(self.peek())
                )));
            }
        }
    }

    fn statement(&mut self, top_level: bool) -> Result<Stmt, SyntaxError> {
        if self.check_ident("metadata") && self.peek_at(1) == &Tok::LBrace {
            if !top_level {
                return Err(self.error("metadata is only allowed at the top level"));
            }
            self.advance();
            return Ok(Stmt::Metadata(self.record_fields()?));
        }
        if let Tok::Ident(name) = self.peek().clone()
            && self.peek_at(1) == &Tok::Assign
        {
            if KEYWORDS.contains(&name.as_str()) {
                return Err(self.error(format!("cannot assign to keyword '{name}'")));
            }
            self.advance();
            self.advance();
            let value = self.expr()?;
            return Ok(Stmt::Assign { name, value });
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::expr_inner)
    }

    fn expr_inner(&mut self) -> Result<Expr, SyntaxError> {
        if self.check_ident("assert") {
            self.advance();
            return Ok(Expr::Assert(Box::new(self.expr()?)));
        }
        if self.check_ident("testset") {
            self.advance();
            let name = match self.advance() {
                Tok::Str(name) => name,
                other => {
                    return Err(self.error(format!(
                        "expected testset name string, found {}",
                        describe(&other)
                    )));
                }
            };
            let body = self.block()?;
            return Ok(Expr::TestSet { name, body });
        }
        self.binary(1)
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let result = self.binary_chain(min_prec);
        self.depth = base;
        result
    }

    // Each operator in a chain nests the tree one level further left.
    fn binary_chain(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        while let Some(op) = binary_op(self.peek()) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            self.deepen()?;
            let rhs = self.binary(prec + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek() {
            Tok::Bang => UnaryOp::Not,
            Tok::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        let expr = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.depth;
        let result = self.postfix_chain();
        self.depth = base;
        result
    }

    fn postfix_chain(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek(), Tok::Dot | Tok::LBracket) {
                self.deepen()?;
            }
            match self.peek() {
                Tok::Dot => {
                    self.advance();
                    match self.advance() {
                        Tok::Ident(name) => {
                            expr = Expr::Field {
                                target: Box::new(expr),
                                name,
                            };
                        }
                        other => {
                            return Err(self.error(format!(
                                "expected field name after '.', found {}",
                                describe(&other)
                            )));
                        }
                    }
                }
                Tok::LBracket => {
                    self.advance();
                    let index = self.expr()?;
                    self.expect(&Tok::RBracket, "']'")?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        match self.advance() {
            Tok::Int(value) => Ok(Expr::Int(value)),
            Tok::Float(value) => Ok(Expr::Float(value)),
            Tok::Str(value) => Ok(Expr::Str(value)),
            Tok::LParen => {
                let expr = self.expr()?;
                self.expect(&Tok::RParen, "')'")?;
                Ok(expr)
            }
            Tok::LBracket => Ok(Expr::List(self.args(&Tok::RBracket, "']'")?)),
            Tok::LBrace => {
                // Step back so record_fields sees the opening brace.
                self.index -= 1;
                Ok(Expr::Record(self.record_fields()?))
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "nothing" => Ok(Expr::Nothing),
                "if" => self.if_rest(),
                "else" | "metadata" | "assert" | "testset" => Err(SyntaxError::new(
                    pos,
                    format!("unexpected keyword '{name}'"),
                )),
                _ if self.check(&Tok::LParen) => {
                    self.advance();
                    let args = self.args(&Tok::RParen, "')'")?;
                    match DirectiveKind::from_name(&name) {
                        Some(kind) => Ok(Expr::Directive(DirectiveCall { kind, args })),
                        None => Ok(Expr::Call { name, args }),
                    }
                }
                _ => Ok(Expr::Var(name)),
            },
            other => Err(SyntaxError::new(
                pos,
                format!("expected expression, found {}", describe(&other)),
            )),
        }
    }

    fn if_rest(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.check_ident("else") {
            self.advance();
            if self.check_ident("if") {
                self.advance();
                vec![Stmt::Expr(self.nested(Self::if_rest)?)]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Expr::If {
            cond: Box::new(cond),
            then,
            otherwise,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect(&Tok::LBrace, "'{'")?;
        let stmts = self.statements(false, &Tok::RBrace)?;
        self.expect(&Tok::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn args(&mut self, close: &Tok, what: &str) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if self.check(close) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.check(&Tok::Comma) {
                self.advance();
                if self.check(close) {
                    self.advance();
                    return Ok(args);
                }
                continue;
            }
            self.expect(close, what)?;
            return Ok(args);
        }
    }

    fn record_fields(&mut self) -> Result<Vec<(String, Expr)>, SyntaxError> {
        self.expect(&Tok::LBrace, "'{'")?;
        let mut fields = Vec::new();
        loop {
            self.skip_newlines();
            if self.check(&Tok::RBrace) {
                self.advance();
                return Ok(fields);
            }
            let key = match self.advance() {
                Tok::Ident(key) | Tok::Str(key) => key,
                other => {
                    return Err(self.error(format!(
                        "expected record key, found {}",
                        describe(&other)
                    )));
                }
            };
            if fields.iter().any(|(existing, _)| existing == &key) {
                return Err(self.error(format!("duplicate record key '{key}'")));
            }
            self.expect(&Tok::Assign, "'=' after record key")?;
            let value = self.expr()?;
            fields.push((key, value));
            self.skip_newlines();
            if self.check(&Tok::Comma) {
                self.advance();
            } else if !self.check(&Tok::RBrace) {
                return Err(self.error(format!(
                    "expected ',' or '}}' in record, found {}",
                    describe(self.peek())
                )));
            }
        }
    }
}

fn binary_op(tok: &Tok) -> Option<BinaryOp> {
    let op = match tok {
        Tok::OrOr => BinaryOp::Or,
        Tok::AndAnd => BinaryOp::And,
        Tok::EqEq => BinaryOp::Eq,
        Tok::NotEq => BinaryOp::Ne,
        Tok::Lt => BinaryOp::Lt,
        Tok::Le => BinaryOp::Le,
        Tok::Gt => BinaryOp::Gt,
        Tok::Ge => BinaryOp::Ge,
        Tok::Plus => BinaryOp::Add,
        Tok::Minus => BinaryOp::Sub,
        Tok::Star => BinaryOp::Mul,
        Tok::Slash => BinaryOp::Div,
        Tok::Percent => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Int(value) => format!("integer {value}"),
        Tok::Float(value) => format!("float {value}"),
        Tok::Str(_) => "string".to_string(),
        Tok::Ident(name) => format!("'{name}'"),
        Tok::Newline => "newline".to_string(),
        Tok::Eof => "end of input".to_string(),
        other => format!("{other:?}"),
    }
}
