//! Agent-facing instruction templates, one per directive kind.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::ast::DirectiveKind;

const VALUE_TEMPLATE: &str = include_str!("prompts/value.md");
const DIRECTORY_TEMPLATE: &str = include_str!("prompts/directory.md");
const CODE_FILE_TEMPLATE: &str = include_str!("prompts/code_file.md");
const COMMIT_TEMPLATE: &str = include_str!("prompts/commit.md");
const MARKDOWN_FILE_TEMPLATE: &str = include_str!("prompts/markdown_file.md");

static ENGINE: LazyLock<PromptEngine> = LazyLock::new(PromptEngine::new);

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (kind, source) in [
            (DirectiveKind::Value, VALUE_TEMPLATE),
            (DirectiveKind::Directory, DIRECTORY_TEMPLATE),
            (DirectiveKind::CodeFile, CODE_FILE_TEMPLATE),
            (DirectiveKind::Commit, COMMIT_TEMPLATE),
            (DirectiveKind::MarkdownFile, MARKDOWN_FILE_TEMPLATE),
        ] {
            env.add_template(kind.as_str(), source)
                .expect("directive templates should be valid");
        }
        Self { env }
    }
}

/// Data available to a directive template.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    /// Instruction text; rendered verbatim, never interpreted as a template.
    pub text: &'a str,
    pub workspace: &'a Path,
    /// The answer file, for file-based directives.
    pub answer_path: Option<&'a Path>,
    pub ext: Option<&'a str>,
}

/// Render the instructions for `kind`.
pub fn render(kind: DirectiveKind, inputs: PromptInputs<'_>) -> Result<String> {
    let template = ENGINE
        .env
        .get_template(kind.as_str())
        .with_context(|| format!("load {} template", kind.as_str()))?;
    let rendered = template
        .render(context! {
            text => inputs.text.trim(),
            workspace => inputs.workspace.display().to_string(),
            path => inputs.answer_path.map(|path| path.display().to_string()),
            ext => inputs.ext,
        })
        .with_context(|| format!("render {} template", kind.as_str()))?;
    debug!(kind = kind.as_str(), bytes = rendered.len(), "rendered instructions");
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(text: &'a str, workspace: &'a Path) -> PromptInputs<'a> {
        PromptInputs {
            text,
            workspace,
            answer_path: None,
            ext: None,
        }
    }

    #[test]
    fn value_prompt_mentions_answer_tags() {
        let out = render(DirectiveKind::Value, inputs("What is 2+2?", Path::new("/w")))
            .expect("render");
        assert!(out.starts_with("What is 2+2?"));
        assert!(out.contains("<answer></answer>"));
    }

    #[test]
    fn placeholder_characters_stay_literal() {
        let text = "Print {{ name }} and ${HOME} and {% raw %}";
        let out = render(DirectiveKind::Value, inputs(text, Path::new("/w"))).expect("render");
        assert!(out.contains(text));
    }

    #[test]
    fn file_prompts_name_the_answer_file() {
        let workspace = Path::new("/tmp/ws");
        let path = workspace.join("answer.jl");
        let out = render(
            DirectiveKind::CodeFile,
            PromptInputs {
                text: "Define f",
                workspace,
                answer_path: Some(&path),
                ext: Some("jl"),
            },
        )
        .expect("render");
        assert!(out.contains("/tmp/ws/answer.jl"));
        assert!(out.contains("answer.jl"));

        let out = render(DirectiveKind::Directory, inputs("Make files", workspace)).expect("render");
        assert!(out.contains("/tmp/ws"));
    }
}
