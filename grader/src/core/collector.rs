//! Nestable assertion collector used by the grading sandbox.
//!
//! Passing assertions only bump a counter. Failures and errors are kept as
//! entries so they can be reported after evaluation finishes; nested
//! collectors (one per `testset`) are kept as entries too and inspected
//! recursively.

use std::fmt;

/// The failing expression and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub expr: String,
    pub detail: String,
}

/// Outcome of a single assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    Pass,
    Fail(Failure),
    Error(Failure),
}

impl Capture {
    pub fn passed(&self) -> bool {
        matches!(self, Capture::Pass)
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capture::Pass => write!(f, "Test Passed"),
            Capture::Fail(failure) => {
                write!(f, "Test Failed: {}\n  {}", failure.expr, failure.detail)
            }
            Capture::Error(failure) => {
                write!(f, "Error During Test: {}\n  {}", failure.expr, failure.detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Fail(Failure),
    Error(Failure),
    Nested(Collector),
}

/// Signal raised when a failure is recorded while fail-fast is enabled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fail-fast after failure in {collector}")]
pub struct FailFast {
    pub collector: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub passes: usize,
    pub fails: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collector {
    pub name: String,
    pub passes: usize,
    pub results: Vec<Entry>,
    pub fail_fast: bool,
}

impl Collector {
    pub fn new(name: impl Into<String>, fail_fast: bool) -> Self {
        Self {
            name: name.into(),
            passes: 0,
            results: Vec::new(),
            fail_fast,
        }
    }

    /// A child collector inheriting this collector's fail-fast setting.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.fail_fast)
    }

    /// Record one assertion outcome.
    pub fn record(&mut self, capture: &Capture) -> Result<(), FailFast> {
        match capture {
            Capture::Pass => {
                self.passes += 1;
                return Ok(());
            }
            Capture::Fail(failure) => self.results.push(Entry::Fail(failure.clone())),
            Capture::Error(failure) => self.results.push(Entry::Error(failure.clone())),
        }
        self.check_fail_fast()
    }

    /// Append a finished child collector.
    pub fn push_nested(&mut self, child: Collector) -> Result<(), FailFast> {
        let failed = child.has_failures();
        self.results.push(Entry::Nested(child));
        if failed {
            return self.check_fail_fast();
        }
        Ok(())
    }

    fn check_fail_fast(&self) -> Result<(), FailFast> {
        if self.fail_fast {
            return Err(FailFast {
                collector: self.name.clone(),
            });
        }
        Ok(())
    }

    /// True if any failure or error was recorded here or in a nested collector.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|entry| match entry {
            Entry::Fail(_) | Entry::Error(_) => true,
            Entry::Nested(child) => child.has_failures(),
        })
    }

    /// Totals across this collector and all nested collectors.
    pub fn counts(&self) -> Counts {
        let mut counts = Counts {
            passes: self.passes,
            ..Counts::default()
        };
        for entry in &self.results {
            match entry {
                Entry::Fail(_) => counts.fails += 1,
                Entry::Error(_) => counts.errors += 1,
                Entry::Nested(child) => {
                    let nested = child.counts();
                    counts.passes += nested.passes;
                    counts.fails += nested.fails;
                    counts.errors += nested.errors;
                }
            }
        }
        counts
    }

    /// Formatted report listing failures and errors only, or `None` when
    /// nothing failed.
    pub fn report(&self) -> Option<String> {
        if !self.has_failures() {
            return None;
        }
        let mut out = String::new();
        self.write_report(&mut out, 0);
        Some(out.trim_end().to_string())
    }

    fn write_report(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let counts = self.counts();
        out.push_str(&format!(
            "{indent}{}: {} passed, {} failed, {} errored\n",
            self.name, counts.passes, counts.fails, counts.errors
        ));
        for entry in &self.results {
            match entry {
                Entry::Fail(failure) => push_indented(
                    out,
                    &indent,
                    &Capture::Fail(failure.clone()).to_string(),
                ),
                Entry::Error(failure) => push_indented(
                    out,
                    &indent,
                    &Capture::Error(failure.clone()).to_string(),
                ),
                Entry::Nested(child) if child.has_failures() => {
                    child.write_report(out, depth + 1);
                }
                Entry::Nested(_) => {}
            }
        }
    }
}

fn push_indented(out: &mut String, indent: &str, text: &str) {
    for line in text.lines() {
        out.push_str(indent);
        out.push_str(line);
        out.push('\n');
    }
}
