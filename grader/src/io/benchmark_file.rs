//! Benchmark files: one namespace of problems per TOML file.
//!
//! ```toml
//! namespace = "arith"
//!
//! [[problem]]
//! name = "add"
//! body = '''
//! Value("What is 2+2?") == 4
//! '''
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::debug;

use crate::io::config::GraderConfig;
use crate::registry::Namespace;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkFile {
    pub namespace: String,
    #[serde(default, rename = "problem")]
    pub problems: Vec<ProblemEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProblemEntry {
    pub name: String,
    pub body: String,
}

impl BenchmarkFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read benchmark {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load benchmark {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let file: BenchmarkFile = toml::from_str(contents).context("parse benchmark")?;
        if file.problems.is_empty() {
            bail!("namespace '{}' declares no problems", file.namespace);
        }
        Ok(file)
    }

    /// Compile every problem into a namespace. The first definition error is fatal.
    pub fn compile(&self, config: &GraderConfig) -> Result<Namespace> {
        let mut builder = Namespace::builder(&self.namespace)?.config(config.clone());
        for entry in &self.problems {
            builder = builder.problem(&entry.name, &entry.body).with_context(|| {
                format!(
                    "namespace '{}', problem '{}'",
                    self.namespace, entry.name
                )
            })?;
        }
        Ok(builder.build())
    }
}

/// Load and compile a single benchmark file.
pub fn load_namespace(path: &Path, config: &GraderConfig) -> Result<Namespace> {
    BenchmarkFile::load(path)?
        .compile(config)
        .with_context(|| format!("compile benchmark {}", path.display()))
}

/// Load every `*.toml` benchmark in `dir`, sorted by namespace.
///
/// Errors if two files declare the same namespace.
pub fn discover(dir: &Path, config: &GraderConfig) -> Result<Vec<Namespace>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read benchmarks dir {}", dir.display()))? {
        let entry = entry.context("read benchmark entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    let mut namespaces = Vec::with_capacity(paths.len());
    for path in &paths {
        namespaces.push(load_namespace(path, config)?);
    }
    namespaces.sort_by(|left, right| left.name().cmp(right.name()));
    for pair in namespaces.windows(2) {
        if pair[0].name() == pair[1].name() {
            return Err(anyhow!("duplicate namespace {}", pair[0].name()));
        }
    }
    debug!(dir = %dir.display(), count = namespaces.len(), "discovered benchmarks");
    Ok(namespaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DefinitionError;

    const ARITH: &str = r#"
namespace = "arith"

[[problem]]
name = "add"
body = '''
metadata { tags = ["easy"] }
Value("What is 2+2?") == 4
'''

[[problem]]
name = "sub"
body = 'Value("What is 5-3?") == 2'
"#;

    #[test]
    fn parses_and_compiles_namespace() {
        let file = BenchmarkFile::parse_str(ARITH).expect("parse");
        assert_eq!(file.namespace, "arith");
        assert_eq!(file.problems.len(), 2);
        let ns = file.compile(&GraderConfig::default()).expect("compile");
        assert_eq!(ns.problem_names(), ["add".to_string(), "sub".to_string()]);
    }

    #[test]
    fn definition_error_reports_problem() {
        let input = "namespace = \"n\"\n[[problem]]\nname = \"broken\"\nbody = \"1 + 1\"\n";
        let file = BenchmarkFile::parse_str(input).expect("parse");
        let err = file.compile(&GraderConfig::default()).expect_err("no directive");
        assert!(format!("{err:#}").contains("problem 'broken'"));
        assert!(matches!(
            err.downcast_ref::<DefinitionError>(),
            Some(DefinitionError::NoDirective { .. })
        ));
    }

    #[test]
    fn rejects_unknown_fields_and_empty_files() {
        let err = BenchmarkFile::parse_str("namespace = \"n\"\nextra = 1\n").expect_err("unknown");
        assert!(format!("{err:#}").contains("extra"));
        let err = BenchmarkFile::parse_str("namespace = \"n\"\n").expect_err("empty");
        assert!(err.to_string().contains("no problems"));
    }

    #[test]
    fn rejects_invalid_namespace_name() {
        let input = "namespace = \"a/b\"\n[[problem]]\nname = \"p\"\nbody = 'Value(\"q\")'\n";
        let file = BenchmarkFile::parse_str(input).expect("parse");
        assert!(file.compile(&GraderConfig::default()).is_err());
    }

    #[test]
    fn discover_loads_sorted_and_rejects_duplicates() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("z.toml"), ARITH).expect("write");
        fs::write(
            temp.path().join("a.toml"),
            "namespace = \"words\"\n[[problem]]\nname = \"w\"\nbody = 'Value(\"word?\") == \"hi\"'\n",
        )
        .expect("write");
        fs::write(temp.path().join("notes.txt"), "ignored").expect("write");

        let namespaces = discover(temp.path(), &GraderConfig::default()).expect("discover");
        let names: Vec<_> = namespaces.iter().map(Namespace::name).collect();
        assert_eq!(names, vec!["arith", "words"]);

        fs::write(temp.path().join("b.toml"), ARITH).expect("write");
        let err = discover(temp.path(), &GraderConfig::default()).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate namespace arith"));

        assert!(
            discover(&temp.path().join("missing"), &GraderConfig::default())
                .expect("missing dir")
                .is_empty()
        );
    }
}
