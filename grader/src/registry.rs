//! Namespaces of problems and the `setup_problem`/`grade` entry points.
//!
//! A namespace is built once and read-only afterwards, so the same
//! [`Namespace`] can serve concurrent calls with different workspaces.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::core::diff::DiffComparator;
use crate::core::score::ScoreRecord;
use crate::error::{DefinitionError, Error};
use crate::interp::Host;
use crate::io::config::GraderConfig;
use crate::io::context;
use crate::io::privilege::PrivilegeDropper;
use crate::problem::{Problem, validate_name};

#[derive(Debug)]
pub struct Namespace {
    name: String,
    order: Vec<String>,
    problems: HashMap<String, Problem>,
    host: Host,
}

/// Collects problems for a [`Namespace`], rejecting duplicates.
#[derive(Debug)]
pub struct NamespaceBuilder {
    namespace: Namespace,
}

impl NamespaceBuilder {
    pub fn config(mut self, config: GraderConfig) -> Self {
        self.namespace.host.config = config;
        self
    }

    pub fn dropper(mut self, dropper: Arc<dyn PrivilegeDropper>) -> Self {
        self.namespace.host.dropper = dropper;
        self
    }

    pub fn diff_comparator(mut self, diff: Arc<dyn DiffComparator>) -> Self {
        self.namespace.host.diff = diff;
        self
    }

    /// Compile `source` and register it as `name`.
    pub fn problem(self, name: &str, source: &str) -> Result<Self, DefinitionError> {
        self.add(Problem::compile(name, source)?)
    }

    pub fn add(mut self, problem: Problem) -> Result<Self, DefinitionError> {
        let ns = &mut self.namespace;
        if ns.problems.contains_key(problem.name()) {
            return Err(DefinitionError::DuplicateProblem {
                namespace: ns.name.clone(),
                problem: problem.name().to_string(),
            });
        }
        ns.order.push(problem.name().to_string());
        ns.problems.insert(problem.name().to_string(), problem);
        Ok(self)
    }

    pub fn build(self) -> Namespace {
        info!(
            namespace = %self.namespace.name,
            problems = self.namespace.order.len(),
            "namespace registered"
        );
        self.namespace
    }
}

/// Outcome of looking up a problem id.
enum Resolved<'a> {
    Found(&'a Problem),
    Empty,
    Unknown,
}

impl Namespace {
    pub fn builder(name: &str) -> Result<NamespaceBuilder, DefinitionError> {
        validate_name(name)?;
        Ok(NamespaceBuilder {
            namespace: Namespace {
                name: name.to_string(),
                order: Vec::new(),
                problems: HashMap::new(),
                host: Host::default(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Problem names in registration order.
    pub fn problem_names(&self) -> &[String] {
        &self.order
    }

    pub fn problem(&self, id: &str) -> Option<&Problem> {
        self.problems.get(self.strip_namespace(id))
    }

    /// `"<namespace>-<name>"` and `"<name>"` name the same problem.
    pub fn strip_namespace<'a>(&self, id: &'a str) -> &'a str {
        id.strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| self.problems.contains_key(*rest))
            .unwrap_or(id)
    }

    fn resolve(&self, id: &str) -> Resolved<'_> {
        if id.trim().is_empty() {
            return Resolved::Empty;
        }
        match self.problem(id) {
            Some(problem) => Resolved::Found(problem),
            None => Resolved::Unknown,
        }
    }

    fn valid_names(&self) -> String {
        self.order.join(", ")
    }

    /// Prepare `workdir` for problem `id` and return the agent's instructions.
    ///
    /// An empty id returns a listing of the namespace, an unknown id a
    /// not-found message; neither is an error.
    #[instrument(skip_all, fields(namespace = %self.name, id = %id))]
    pub fn setup_problem(&self, workdir: &Path, id: &str) -> Result<String, Error> {
        let problem = match self.resolve(id) {
            Resolved::Found(problem) => problem,
            Resolved::Empty => {
                let mut listing = format!("Problems in namespace '{}':", self.name);
                for name in &self.order {
                    listing.push_str("\n  ");
                    listing.push_str(name);
                }
                return Ok(listing);
            }
            Resolved::Unknown => {
                warn!("unknown problem id");
                return Ok(format!(
                    "Problem '{id}' not found in namespace '{}'. Valid problems: {}",
                    self.name,
                    self.valid_names()
                ));
            }
        };
        fs::create_dir_all(workdir).map_err(|err| Error::Setup {
            problem: problem.name().to_string(),
            message: format!("create {}: {err}", workdir.display()),
        })?;
        context::with_workspace(workdir, || {
            let workspace = context::workspace()?;
            debug!(workspace = %workspace.display(), "running setup");
            problem.run_setup(&self.host, &workspace)
        })?
    }

    /// Grade the answer for problem `id`. Never fails for a bad id: the
    /// returned record scores 0.0 and carries an `error` entry instead.
    #[instrument(skip_all, fields(namespace = %self.name, id = %id))]
    pub fn grade(&self, workdir: &Path, transcript: &str, id: &str) -> Result<ScoreRecord, Error> {
        let problem = match self.resolve(id) {
            Resolved::Found(problem) => problem,
            Resolved::Empty => {
                return Ok(ScoreRecord::zero_with_error(
                    &self.name,
                    format!(
                        "problem_id is required. Valid problems: {}",
                        self.valid_names()
                    ),
                ));
            }
            Resolved::Unknown => {
                warn!("unknown problem id");
                return Ok(ScoreRecord::zero_with_error(
                    id,
                    format!(
                        "Problem '{id}' not found in namespace '{}'. Valid problems: {}",
                        self.name,
                        self.valid_names()
                    ),
                ));
            }
        };
        context::with_workspace(workdir, || {
            let workspace = context::workspace()?;
            debug!(workspace = %workspace.display(), "grading");
            problem.run_grade(&self.host, &workspace, transcript)
        })?
    }

    /// `{id, ...metadata}` for every problem, in registration order.
    pub fn list_problems(&self) -> Vec<serde_json::Value> {
        self.order
            .iter()
            .filter_map(|name| self.problems.get(name))
            .map(|problem| {
                let mut entry = serde_json::Map::new();
                entry.insert(
                    "id".to_string(),
                    serde_json::Value::String(problem.name().to_string()),
                );
                for (key, value) in problem.metadata() {
                    entry.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(entry)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arith() -> Namespace {
        Namespace::builder("arith")
            .expect("builder")
            .problem(
                "add",
                "metadata { weight = 2 }\nValue(\"What is 2+2?\") == 4",
            )
            .expect("add")
            .problem("sub", "Value(\"What is 5-3?\") == 2")
            .expect("sub")
            .build()
    }

    #[test]
    fn rejects_duplicate_problems() {
        let err = Namespace::builder("arith")
            .expect("builder")
            .problem("add", "Value(\"a\") == 1")
            .expect("first")
            .problem("add", "Value(\"b\") == 2")
            .expect_err("duplicate");
        assert!(matches!(err, DefinitionError::DuplicateProblem { .. }));
    }

    #[test]
    fn strips_namespace_prefix() {
        let ns = arith();
        assert_eq!(ns.strip_namespace("arith-add"), "add");
        assert_eq!(ns.strip_namespace("add"), "add");
        assert_eq!(ns.strip_namespace("arith-missing"), "arith-missing");
        assert!(ns.problem("arith-sub").is_some());
    }

    #[test]
    fn lists_problems_in_order_with_metadata() {
        let listing = arith().list_problems();
        assert_eq!(
            listing,
            vec![
                serde_json::json!({ "id": "add", "weight": 2 }),
                serde_json::json!({ "id": "sub" }),
            ]
        );
    }

    #[test]
    fn setup_with_empty_or_unknown_id_describes_namespace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ns = arith();
        let listing = ns.setup_problem(temp.path(), "").expect("listing");
        assert!(listing.contains("add"));
        assert!(listing.contains("sub"));

        let missing = ns.setup_problem(temp.path(), "mul").expect("not found");
        assert!(missing.contains("'mul' not found"));
        assert!(missing.contains("add, sub"));
    }

    #[test]
    fn namespace_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Namespace>();
    }
}
