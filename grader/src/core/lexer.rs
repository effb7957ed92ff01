//! Tokenizer for benchmark bodies.

use std::iter::Peekable;
use std::str::Chars;

/// A syntax error with a 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semi,
    Newline,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub pos: Pos,
}

/// Split source into tokens.
///
/// Newlines are significant statement separators except inside `()` and `[]`.
/// The returned stream always ends with `Tok::Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            return true;
        }
        false
    }

    fn push(&mut self, tok: Tok, pos: Pos) {
        self.tokens.push(Token { tok, pos });
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(&ch) = self.chars.peek() {
            let pos = self.pos();
            match ch {
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        self.push(Tok::Newline, pos);
                    }
                }
                c if c.is_whitespace() => {
                    self.bump();
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '"' => {
                    let value = self.string(pos)?;
                    self.push(Tok::Str(value), pos);
                }
                c if c.is_ascii_digit() => {
                    let tok = self.number(pos)?;
                    self.push(tok, pos);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if !(c.is_alphanumeric() || c == '_') {
                            break;
                        }
                        ident.push(c);
                        self.bump();
                    }
                    self.push(Tok::Ident(ident), pos);
                }
                _ => {
                    self.bump();
                    let tok = self.punct(ch, pos)?;
                    self.push(tok, pos);
                }
            }
        }
        let pos = self.pos();
        self.push(Tok::Eof, pos);
        Ok(self.tokens)
    }

    fn punct(&mut self, ch: char, pos: Pos) -> Result<Tok, SyntaxError> {
        let tok = match ch {
            '(' => {
                self.depth += 1;
                Tok::LParen
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RParen
            }
            '[' => {
                self.depth += 1;
                Tok::LBracket
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                Tok::RBracket
            }
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            ';' => Tok::Semi,
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            '=' if self.eat('=') => Tok::EqEq,
            '=' => Tok::Assign,
            '!' if self.eat('=') => Tok::NotEq,
            '!' => Tok::Bang,
            '<' if self.eat('=') => Tok::Le,
            '<' => Tok::Lt,
            '>' if self.eat('=') => Tok::Ge,
            '>' => Tok::Gt,
            '&' if self.eat('&') => Tok::AndAnd,
            '|' if self.eat('|') => Tok::OrOr,
            other => {
                return Err(SyntaxError::new(
                    pos,
                    format!("unexpected character '{other}'"),
                ));
            }
        };
        Ok(tok)
    }

    fn string(&mut self, start: Pos) -> Result<String, SyntaxError> {
        self.bump();
        let mut value = String::new();
        loop {
            let pos = self.pos();
            match self.bump() {
                None => return Err(SyntaxError::new(start, "unterminated string literal")),
                Some('"') => return Ok(value),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(other) => {
                            return Err(SyntaxError::new(
                                pos,
                                format!("unknown escape '\\{other}'"),
                            ));
                        }
                        None => {
                            return Err(SyntaxError::new(start, "unterminated string literal"));
                        }
                    };
                    value.push(escaped);
                }
                Some(ch) => value.push(ch),
            }
        }
    }

    fn number(&mut self, pos: Pos) -> Result<Tok, SyntaxError> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.bump();
            } else if c == '.' && !is_float && self.next_is_digit_after_dot() {
                is_float = true;
                text.push(c);
                self.bump();
            } else if (c == 'e' || c == 'E') && !text.contains(['e', 'E']) {
                is_float = true;
                text.push(c);
                self.bump();
                if let Some(&sign) = self.chars.peek()
                    && (sign == '+' || sign == '-')
                {
                    text.push(sign);
                    self.bump();
                }
            } else {
                break;
            }
        }
        let cleaned = text.replace('_', "");
        if is_float {
            cleaned
                .parse::<f64>()
                .map(Tok::Float)
                .map_err(|_| SyntaxError::new(pos, format!("invalid number '{text}'")))
        } else {
            cleaned
                .parse::<i64>()
                .map(Tok::Int)
                .map_err(|_| SyntaxError::new(pos, format!("integer out of range '{text}'")))
        }
    }

    /// `1.5` is a float; `x.0` style field access never reaches here, and
    /// `1.len` is rejected later by the parser.
    fn next_is_digit_after_dot(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().is_some_and(|c| c.is_ascii_digit())
    }
}
