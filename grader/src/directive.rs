//! Prompt directives: what to ask the agent and where to find its answer.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument};

use crate::core::ast::{DirectiveCall, DirectiveKind, Expr};
use crate::core::parser::{parse_literal, parse_program};
use crate::core::value::{CodeAnswer, Value};
use crate::interp::{EvalError, Interpreter, Scope};
use crate::io::git::Git;
use crate::io::prompt::{self, PromptInputs};

pub const DEFAULT_CODE_EXT: &str = "jl";

static ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<answer>(.*?)</answer>").expect("answer pattern should be valid")
});

/// A validated directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// Instruction text, evaluated in the setup scope when rendering.
    pub text: Expr,
    /// Answer file extension (code files only).
    pub ext: Option<String>,
}

impl TryFrom<DirectiveCall> for Directive {
    type Error = String;

    fn try_from(call: DirectiveCall) -> Result<Self, Self::Error> {
        let kind = call.kind;
        let mut args = call.args.into_iter();
        let text = args
            .next()
            .ok_or_else(|| "expected instruction text as the first argument".to_string())?;
        let ext = match (kind, args.next()) {
            (DirectiveKind::CodeFile, Some(Expr::Str(ext))) => Some(validate_ext(ext)?),
            (DirectiveKind::CodeFile, Some(other)) => {
                return Err(format!("file extension must be a string literal, found `{other}`"));
            }
            (DirectiveKind::CodeFile, None) => Some(DEFAULT_CODE_EXT.to_string()),
            (_, Some(extra)) => return Err(format!("unexpected argument `{extra}`")),
            (_, None) => None,
        };
        if let Some(extra) = args.next() {
            return Err(format!("unexpected argument `{extra}`"));
        }
        Ok(Self { kind, text, ext })
    }
}

fn validate_ext(ext: String) -> Result<String, String> {
    let ext = ext.trim_start_matches('.').to_string();
    if ext.is_empty() || !ext.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(format!("invalid file extension '{ext}'"));
    }
    Ok(ext)
}

/// Result of reading an answer out of the workspace or transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Answer(Value),
    Absent,
}

impl Extracted {
    pub fn into_value(self) -> Value {
        match self {
            Extracted::Answer(value) => value,
            Extracted::Absent => Value::Nothing,
        }
    }
}

impl Directive {
    fn answer_path(&self, workspace: &Path) -> Option<PathBuf> {
        match self.kind {
            DirectiveKind::CodeFile => {
                let ext = self.ext.as_deref().unwrap_or(DEFAULT_CODE_EXT);
                Some(workspace.join(format!("answer.{ext}")))
            }
            DirectiveKind::MarkdownFile => Some(workspace.join("answer.md")),
            DirectiveKind::Value | DirectiveKind::Directory | DirectiveKind::Commit => None,
        }
    }

    /// Render agent-facing instructions, evaluating the text in `scope`.
    #[instrument(skip_all, fields(kind = self.kind.as_str()))]
    pub fn render(
        &self,
        interp: &mut Interpreter<'_>,
        scope: &mut Scope,
        workspace: &Path,
    ) -> Result<String, EvalError> {
        let text = match interp.eval(&self.text, scope)? {
            Value::Str(text) => text,
            other => {
                return Err(EvalError::Runtime(anyhow!(
                    "{} instruction text must be a string, got {}",
                    self.kind.as_str(),
                    other.type_name()
                )));
            }
        };
        let answer_path = self.answer_path(workspace);
        let rendered = prompt::render(
            self.kind,
            PromptInputs {
                text: &text,
                workspace,
                answer_path: answer_path.as_deref(),
                ext: self.ext.as_deref(),
            },
        )?;
        Ok(rendered)
    }

    /// Read the agent's answer. `Err` means the answer exists but is unusable.
    #[instrument(skip_all, fields(kind = self.kind.as_str()))]
    pub fn extract(&self, workspace: &Path, transcript: &str) -> Result<Extracted> {
        let extracted = match self.kind {
            DirectiveKind::Value => extract_value(transcript),
            DirectiveKind::Directory => {
                Extracted::Answer(Value::Str(workspace.display().to_string()))
            }
            DirectiveKind::CodeFile => match self.answer_path(workspace) {
                Some(path) => extract_code(&path)?,
                None => Extracted::Absent,
            },
            DirectiveKind::Commit => extract_commit(workspace)?,
            DirectiveKind::MarkdownFile => match self.answer_path(workspace) {
                Some(path) if path.is_file() => Extracted::Answer(Value::Str(
                    fs::read_to_string(&path)
                        .with_context(|| format!("read {}", path.display()))?,
                )),
                _ => Extracted::Absent,
            },
        };
        debug!(absent = extracted == Extracted::Absent, "answer extracted");
        Ok(extracted)
    }
}

/// Last `<answer>…</answer>` in the transcript, parsed as a literal when possible.
pub fn extract_value(transcript: &str) -> Extracted {
    let Some(captures) = ANSWER_RE.captures_iter(transcript).last() else {
        return Extracted::Absent;
    };
    let raw = captures.get(1).map_or("", |m| m.as_str()).trim();
    let value = parse_literal(raw)
        .and_then(|expr| Value::from_literal(&expr))
        .unwrap_or_else(|| Value::str(raw));
    Extracted::Answer(value)
}

fn extract_code(path: &Path) -> Result<Extracted> {
    if !path.is_file() {
        return Ok(Extracted::Absent);
    }
    let source = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let program =
        parse_program(&source).with_context(|| format!("parse {}", path.display()))?;
    Ok(Extracted::Answer(Value::Code(Arc::new(CodeAnswer {
        path: path.to_path_buf(),
        source,
        program,
    }))))
}

fn extract_commit(workspace: &Path) -> Result<Extracted> {
    let git = Git::new(workspace);
    if !git.is_repo() {
        return Ok(Extracted::Absent);
    }
    let Some(commit) = git.head_commit()? else {
        return Ok(Extracted::Absent);
    };
    let patch = git.show_patch(&commit.sha)?;
    Ok(Extracted::Answer(Value::Record(BTreeMap::from([
        ("sha".to_string(), Value::Str(commit.sha)),
        ("author".to_string(), Value::Str(commit.author)),
        ("email".to_string(), Value::Str(commit.email)),
        ("summary".to_string(), Value::Str(commit.summary)),
        ("message".to_string(), Value::Str(commit.message)),
        ("patch".to_string(), Value::Str(patch)),
    ]))))
}
