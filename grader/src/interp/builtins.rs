//! Builtin functions callable from benchmark code.
//!
//! Relative paths resolve against the active workspace.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, anyhow};
use tracing::debug;

use super::{EvalError, Interpreter, Scope, runtime};
use crate::core::value::{CodeAnswer, Value};
use crate::io::context;
use crate::io::git::Git;
use crate::io::process::run_command_with_timeout;

const DEFAULT_TOLERANCE: f64 = 1e-6;

pub(super) fn call(
    interp: &mut Interpreter<'_>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, EvalError> {
    let args = Args { name, values: args };
    match name {
        // Files.
        "workspace" => {
            args.arity(0, 0)?;
            Ok(Value::Str(context::workspace()?.display().to_string()))
        }
        "path" => {
            args.arity(1, 1)?;
            Ok(path_value(&resolve(args.string(0)?)?))
        }
        "write_file" => {
            args.arity(2, 2)?;
            let path = resolve(args.string(0)?)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&path, args.string(1)?)
                .with_context(|| format!("write {}", path.display()))?;
            debug!(path = %path.display(), "wrote file");
            Ok(Value::Nothing)
        }
        "read_file" => {
            args.arity(1, 1)?;
            let path = resolve(args.string(0)?)?;
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            Ok(Value::Str(contents))
        }
        "file_exists" => {
            args.arity(1, 1)?;
            Ok(Value::Bool(resolve(args.string(0)?)?.is_file()))
        }
        "dir_exists" => {
            args.arity(1, 1)?;
            Ok(Value::Bool(resolve(args.string(0)?)?.is_dir()))
        }
        "mkdir" => {
            args.arity(1, 1)?;
            let path = resolve(args.string(0)?)?;
            fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
            Ok(Value::Nothing)
        }
        "remove" => {
            args.arity(1, 1)?;
            let path = resolve(args.string(0)?)?;
            let existed = if path.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("remove {}", path.display()))?;
                true
            } else if path.exists() {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
                true
            } else {
                false
            };
            Ok(Value::Bool(existed))
        }
        "list_dir" => {
            args.arity(0, 1)?;
            let path = match args.values.first() {
                Some(_) => resolve(args.string(0)?)?,
                None => context::workspace()?,
            };
            let mut names = Vec::new();
            for entry in fs::read_dir(&path).with_context(|| format!("list {}", path.display()))? {
                let entry = entry.with_context(|| format!("list {}", path.display()))?;
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            Ok(Value::List(names.into_iter().map(Value::Str).collect()))
        }

        // Processes.
        "run" => {
            args.arity(1, 1)?;
            let cmd = command(&args, 0)?;
            run(interp, cmd)
        }
        "run_as" => {
            args.arity(2, 2)?;
            let uid = u32::try_from(args.int(0)?)
                .map_err(|_| runtime("run_as expects a non-negative uid"))?;
            let cmd = command(&args, 1)?;
            let cmd = interp.host().dropper.as_user(cmd, Some(uid));
            run(interp, cmd)
        }
        "git" => {
            let git_args = (0..args.values.len())
                .map(|index| args.string(index))
                .collect::<Result<Vec<_>, _>>()?;
            if git_args.is_empty() {
                return Err(runtime("git expects at least one argument"));
            }
            let out = Git::new(context::workspace()?).run_capture(&git_args)?;
            Ok(Value::Str(out))
        }
        "commit_count" => {
            args.arity(0, 0)?;
            let git = Git::new(context::workspace()?);
            if !git.is_repo() {
                return Ok(Value::Int(0));
            }
            let count = git.commit_count()?;
            Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        }
        "git_status" => {
            args.arity(0, 0)?;
            let git = Git::new(context::workspace()?);
            if !git.is_repo() {
                return Ok(Value::List(Vec::new()));
            }
            let entries = git.status_porcelain()?;
            Ok(Value::List(
                entries
                    .into_iter()
                    .map(|entry| {
                        Value::Record(BTreeMap::from([
                            ("code".to_string(), Value::Str(entry.code)),
                            ("path".to_string(), Value::Str(entry.path)),
                        ]))
                    })
                    .collect(),
            ))
        }

        // Values.
        "len" => {
            args.arity(1, 1)?;
            let len = match args.get(0)? {
                Value::Str(text) => text.chars().count(),
                Value::List(items) => items.len(),
                Value::Record(fields) => fields.len(),
                other => return Err(args.type_error(0, "string, list or record", other)),
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        "contains" => {
            args.arity(2, 2)?;
            let found = match (args.get(0)?, args.get(1)?) {
                (Value::Str(text), Value::Str(needle)) => text.contains(needle.as_str()),
                (Value::List(items), needle) => items.iter().any(|item| item.equals(needle)),
                (Value::Record(fields), Value::Str(key)) => fields.contains_key(key),
                (other, _) => return Err(args.type_error(0, "string, list or record", other)),
            };
            Ok(Value::Bool(found))
        }
        "starts_with" => {
            args.arity(2, 2)?;
            Ok(Value::Bool(args.string(0)?.starts_with(args.string(1)?)))
        }
        "ends_with" => {
            args.arity(2, 2)?;
            Ok(Value::Bool(args.string(0)?.ends_with(args.string(1)?)))
        }
        "trim" => {
            args.arity(1, 1)?;
            Ok(Value::str(args.string(0)?.trim()))
        }
        "lowercase" => {
            args.arity(1, 1)?;
            Ok(Value::Str(args.string(0)?.to_lowercase()))
        }
        "lines" => {
            args.arity(1, 1)?;
            Ok(Value::List(args.string(0)?.lines().map(Value::str).collect()))
        }
        "string" => {
            args.arity(1, 1)?;
            Ok(Value::Str(args.get(0)?.to_string()))
        }
        "int" => {
            args.arity(1, 1)?;
            to_int(&args)
        }
        "float" => {
            args.arity(1, 1)?;
            let number = match args.get(0)? {
                Value::Str(text) => text
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| runtime(format!("cannot convert {text:?} to float")))?,
                other => other
                    .as_f64()
                    .ok_or_else(|| args.type_error(0, "number or string", other))?,
            };
            Ok(Value::Float(number))
        }
        "abs" => {
            args.arity(1, 1)?;
            match args.get(0)? {
                Value::Int(number) => number
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| runtime("integer overflow in abs")),
                Value::Float(number) => Ok(Value::Float(number.abs())),
                other => Err(args.type_error(0, "number", other)),
            }
        }
        "min" | "max" => extremum(&args, name == "max"),
        "approx" => {
            args.arity(2, 3)?;
            let a = args.number(0)?;
            let b = args.number(1)?;
            let tolerance = match args.values.get(2) {
                Some(_) => args.number(2)?,
                None => DEFAULT_TOLERANCE,
            };
            Ok(Value::Bool((a - b).abs() <= tolerance))
        }
        "keys" => {
            args.arity(1, 1)?;
            match args.get(0)? {
                Value::Record(fields) => Ok(Value::List(
                    fields.keys().map(|key| Value::Str(key.clone())).collect(),
                )),
                other => Err(args.type_error(0, "record", other)),
            }
        }
        "get" => {
            args.arity(2, 3)?;
            let default = args.values.get(2).cloned().unwrap_or(Value::Nothing);
            match args.get(0)? {
                Value::Record(fields) => Ok(fields.get(args.string(1)?).cloned().unwrap_or(default)),
                other => Err(args.type_error(0, "record", other)),
            }
        }
        "error" => {
            args.arity(1, 1)?;
            Err(runtime(args.get(0)?))
        }

        // Code answers.
        "definitions" => {
            args.arity(1, 1)?;
            let code = args.code(0)?;
            Ok(Value::List(
                code.definitions().into_iter().map(Value::Str).collect(),
            ))
        }
        "defines" => {
            args.arity(2, 2)?;
            let code = args.code(0)?;
            let name = args.string(1)?;
            Ok(Value::Bool(code.definitions().iter().any(|def| def == name)))
        }
        "evaluate" => {
            args.arity(1, 1)?;
            let code = args.code(0)?;
            let mut nested = Interpreter::new(interp.host());
            let mut scope = Scope::new();
            nested
                .exec_block(&code.program, &mut scope)
                .map_err(|err| match err {
                    EvalError::Runtime(err) => EvalError::Runtime(
                        err.context(format!("evaluate {}", code.path.display())),
                    ),
                    other => other,
                })?;
            Ok(Value::Record(scope))
        }

        // Commits.
        "same_diff" => {
            args.arity(2, 3)?;
            let a = patch_text(&args, 0)?;
            let b = patch_text(&args, 1)?;
            let ignore_whitespace = match args.values.get(2) {
                Some(Value::Bool(flag)) => *flag,
                Some(other) => return Err(args.type_error(2, "bool", other)),
                None => false,
            };
            let same = interp.host().diff.equivalent(a, b, ignore_whitespace)?;
            Ok(Value::Bool(same))
        }

        _ => Err(runtime(format!("unknown function '{name}'"))),
    }
}

struct Args<'a> {
    name: &'a str,
    values: Vec<Value>,
}

impl Args<'_> {
    fn arity(&self, min: usize, max: usize) -> Result<(), EvalError> {
        let count = self.values.len();
        if (min..=max).contains(&count) {
            return Ok(());
        }
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        Err(runtime(format!(
            "{} expects {expected} argument(s), got {count}",
            self.name
        )))
    }

    fn get(&self, index: usize) -> Result<&Value, EvalError> {
        self.values
            .get(index)
            .ok_or_else(|| runtime(format!("{} is missing argument {}", self.name, index + 1)))
    }

    fn type_error(&self, index: usize, expected: &str, found: &Value) -> EvalError {
        runtime(format!(
            "{} argument {} must be a {expected}, got {}",
            self.name,
            index + 1,
            found.type_name()
        ))
    }

    fn string(&self, index: usize) -> Result<&str, EvalError> {
        match self.get(index)? {
            Value::Str(text) => Ok(text),
            other => Err(self.type_error(index, "string", other)),
        }
    }

    fn int(&self, index: usize) -> Result<i64, EvalError> {
        match self.get(index)? {
            Value::Int(number) => Ok(*number),
            other => Err(self.type_error(index, "int", other)),
        }
    }

    fn number(&self, index: usize) -> Result<f64, EvalError> {
        let value = self.get(index)?;
        value
            .as_f64()
            .ok_or_else(|| self.type_error(index, "number", value))
    }

    fn code(&self, index: usize) -> Result<&CodeAnswer, EvalError> {
        match self.get(index)? {
            Value::Code(code) => Ok(code),
            other => Err(self.type_error(index, "code answer", other)),
        }
    }
}

fn resolve(path: &str) -> Result<PathBuf, EvalError> {
    let path = Path::new(path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(context::workspace()?.join(path))
}

fn path_value(path: &Path) -> Value {
    Value::Str(path.display().to_string())
}

fn command(args: &Args<'_>, index: usize) -> Result<Command, EvalError> {
    let Value::List(parts) = args.get(index)? else {
        return Err(args.type_error(index, "list of strings", args.get(index)?));
    };
    let mut parts = parts.iter().map(|part| match part {
        Value::Str(text) => Ok(text.as_str()),
        other => Err(args.type_error(index, "list of strings", other)),
    });
    let program = parts
        .next()
        .ok_or_else(|| runtime(format!("{} expects a non-empty command", args.name)))??;
    let mut cmd = Command::new(program);
    for part in parts {
        cmd.arg(part?);
    }
    cmd.current_dir(context::workspace()?);
    Ok(cmd)
}

fn run(interp: &Interpreter<'_>, cmd: Command) -> Result<Value, EvalError> {
    let config = &interp.host().config;
    let out = run_command_with_timeout(
        cmd,
        None,
        config.command_timeout(),
        config.command_output_limit_bytes,
    )?;
    Ok(Value::Record(BTreeMap::from([
        (
            "status".to_string(),
            out.status
                .code()
                .map(|code| Value::Int(i64::from(code)))
                .unwrap_or(Value::Nothing),
        ),
        ("success".to_string(), Value::Bool(out.success())),
        ("timed_out".to_string(), Value::Bool(out.timed_out)),
        ("stdout".to_string(), Value::Str(out.stdout_lossy())),
        ("stderr".to_string(), Value::Str(out.stderr_lossy())),
    ])))
}

fn to_int(args: &Args<'_>) -> Result<Value, EvalError> {
    let number = match args.get(0)? {
        Value::Int(number) => *number,
        Value::Bool(flag) => i64::from(*flag),
        Value::Float(number) if number.is_finite() => number.trunc() as i64,
        Value::Str(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| runtime(format!("cannot convert {text:?} to int")))?,
        other => return Err(args.type_error(0, "number, bool or string", other)),
    };
    Ok(Value::Int(number))
}

fn extremum(args: &Args<'_>, max: bool) -> Result<Value, EvalError> {
    let items: &[Value] = match args.values.as_slice() {
        [Value::List(items)] => items.as_slice(),
        values => values,
    };
    let mut best: Option<&Value> = None;
    for item in items {
        let number = item
            .as_f64()
            .ok_or_else(|| anyhow!("{} expects numbers, got {}", args.name, item.type_name()))?;
        let better = match best.and_then(Value::as_f64) {
            None => true,
            Some(current) if max => number > current,
            Some(current) => number < current,
        };
        if better {
            best = Some(item);
        }
    }
    best.cloned()
        .ok_or_else(|| runtime(format!("{} expects at least one number", args.name)))
}

fn patch_text<'v>(args: &'v Args<'_>, index: usize) -> Result<&'v str, EvalError> {
    match args.get(index)? {
        Value::Str(text) => Ok(text),
        Value::Record(fields) => match fields.get("patch") {
            Some(Value::Str(text)) => Ok(text),
            _ => Err(runtime(format!(
                "{} argument {} has no patch",
                args.name,
                index + 1
            ))),
        },
        other => Err(args.type_error(index, "patch string or commit", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_program;
    use crate::interp::Host;
    use crate::io::context::with_workspace;
    use std::sync::Arc;

    fn eval_in(dir: &Path, source: &str) -> Result<Value, EvalError> {
        let host = Host::default();
        let program = parse_program(source).expect("parse");
        with_workspace(dir, || {
            Interpreter::new(&host).exec_block(&program, &mut Scope::new())
        })
        .expect("install")
    }

    #[test]
    fn file_builtins_use_the_active_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let value = eval_in(
            temp.path(),
            "write_file(\"sub/a.txt\", \"hello\")\n[file_exists(\"sub/a.txt\"), dir_exists(\"sub\"), read_file(\"sub/a.txt\")]",
        )
        .expect("eval");
        assert_eq!(
            value,
            Value::List(vec![Value::Bool(true), Value::Bool(true), Value::str("hello")])
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("sub/a.txt")).expect("read"),
            "hello"
        );

        let listed = eval_in(temp.path(), "mkdir(\"b\")\nlist_dir()").expect("eval");
        assert_eq!(listed, Value::List(vec![Value::str("b"), Value::str("sub")]));

        let removed = eval_in(temp.path(), "[remove(\"sub\"), remove(\"sub\")]").expect("eval");
        assert_eq!(removed, Value::List(vec![Value::Bool(true), Value::Bool(false)]));
    }

    #[test]
    fn missing_workspace_is_a_context_error() {
        let host = Host::default();
        let program = parse_program("read_file(\"x\")").expect("parse");
        let result = Interpreter::new(&host).exec_block(&program, &mut Scope::new());
        // The lazy default may be set in the environment running the tests.
        if context::installed().is_none() && std::env::var_os(context::WORKSPACE_ENV).is_none() {
            assert!(matches!(result, Err(EvalError::Context(_))));
        }
    }

    #[test]
    fn run_captures_output_in_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("marker"), "").expect("write");
        let value = eval_in(temp.path(), "r = run([\"ls\"])\n[r.success, trim(r.stdout), r.status]")
            .expect("eval");
        assert_eq!(
            value,
            Value::List(vec![Value::Bool(true), Value::str("marker"), Value::Int(0)])
        );
    }

    #[test]
    fn value_helpers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cases = [
            ("len(\"héllo\")", Value::Int(5)),
            ("contains([1, 2], 2.0)", Value::Bool(true)),
            ("contains({ a = 1 }, \"a\")", Value::Bool(true)),
            ("starts_with(\"abc\", \"ab\")", Value::Bool(true)),
            ("lines(\"a\\nb\")", Value::List(vec![Value::str("a"), Value::str("b")])),
            ("int(\" 42 \")", Value::Int(42)),
            ("int(3.9)", Value::Int(3)),
            ("float(\"2.5\")", Value::Float(2.5)),
            ("string(1.5)", Value::str("1.5")),
            ("max(1, 3.5, 2)", Value::Float(3.5)),
            ("min([4, 2, 8])", Value::Int(2)),
            ("abs(-3)", Value::Int(3)),
            ("approx(0.1 + 0.2, 0.3)", Value::Bool(true)),
            ("approx(1, 1.5, 0.1)", Value::Bool(false)),
            ("keys({ b = 1, a = 2 })", Value::List(vec![Value::str("a"), Value::str("b")])),
            ("get({ a = 1 }, \"z\", 0)", Value::Int(0)),
        ];
        for (source, expected) in cases {
            assert_eq!(eval_in(temp.path(), source).expect(source), expected, "{source}");
        }
    }

    #[test]
    fn error_and_unknown_functions_fail() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = eval_in(temp.path(), "error(\"custom\")").expect_err("error");
        assert_eq!(err.to_string(), "custom");
        let err = eval_in(temp.path(), "nope()").expect_err("unknown");
        assert!(err.to_string().contains("unknown function 'nope'"));
        let err = eval_in(temp.path(), "len(1, 2)").expect_err("arity");
        assert!(err.to_string().contains("len expects 1 argument(s), got 2"));
    }

    #[test]
    fn code_answers_expose_definitions_and_evaluate() {
        let host = Host::default();
        let code = CodeAnswer {
            path: PathBuf::from("answer.jl"),
            source: "square = 4 * 4\nlabel = \"sq\"".to_string(),
            program: parse_program("square = 4 * 4\nlabel = \"sq\"").expect("parse"),
        };
        let answer = Value::Code(Arc::new(code));
        let program = parse_program(
            "defs = definitions(answer)\nr = evaluate(answer)\n[defs, defines(answer, \"square\"), r.square]",
        )
        .expect("parse");
        let mut scope = Scope::from([("answer".to_string(), answer.clone())]);
        let mut interp = Interpreter::grading(
            &host,
            answer,
            crate::core::collector::Collector::new("p", false),
        );
        let value = interp.exec_block(&program, &mut scope).expect("eval");
        assert_eq!(
            value,
            Value::List(vec![
                Value::List(vec![Value::str("square"), Value::str("label")]),
                Value::Bool(true),
                Value::Int(16),
            ])
        );
    }

    #[test]
    fn same_diff_compares_patches() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = r#"
a = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-1\n+2\n"
b = "diff --git a/x b/x\nindex 1..2 100644\n--- a/x\n+++ b/x\n@@ -5 +5 @@\n-1\n+2\n"
[same_diff(a, b), same_diff(a, { patch = b }), same_diff(a, "")]
"#;
        let value = eval_in(temp.path(), source).expect("eval");
        assert_eq!(
            value,
            Value::List(vec![Value::Bool(true), Value::Bool(true), Value::Bool(false)])
        );
    }
}
