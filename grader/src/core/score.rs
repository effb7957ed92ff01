//! Canonical score records and outcome normalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::collector::Capture;
use crate::core::value::Value;

/// `{score, subscores, weights, metadata?}` as reported for every graded problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: f64,
    #[serde(default)]
    pub subscores: BTreeMap<String, f64>,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl ScoreRecord {
    fn for_problem(score: f64, problem: &str) -> Self {
        let mut record = Self {
            score,
            subscores: BTreeMap::new(),
            weights: BTreeMap::new(),
            metadata: None,
        };
        record.fill_problem_entries(problem);
        record
    }

    /// A zero score carrying `error` in its metadata.
    pub fn zero_with_error(problem: &str, error: impl Into<String>) -> Self {
        let mut record = Self::for_problem(0.0, problem);
        record.insert_metadata("error", serde_json::Value::String(error.into()));
        record
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }

    fn fill_problem_entries(&mut self, problem: &str) {
        self.subscores
            .entry(problem.to_string())
            .or_insert(self.score);
        self.weights.entry(problem.to_string()).or_insert(1.0);
    }
}

/// The value types a grading fragment may end in.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Bool(bool),
    Score(f64),
    Record(BTreeMap<String, Value>),
    Capture(Capture),
}

/// A grading value of a type that cannot be scored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("grading produced a value of type {type_name}, which cannot be scored")]
pub struct UnrecognizedOutcome {
    pub type_name: &'static str,
}

impl TryFrom<Value> for Outcome {
    type Error = UnrecognizedOutcome;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(flag) => Ok(Outcome::Bool(flag)),
            Value::Int(number) => Ok(Outcome::Score(number as f64)),
            Value::Float(number) => Ok(Outcome::Score(number)),
            Value::Record(fields) => Ok(Outcome::Record(fields)),
            Value::Capture(capture) => Ok(Outcome::Capture(capture)),
            other => Err(UnrecognizedOutcome {
                type_name: other.type_name(),
            }),
        }
    }
}

/// Convert a grading value into a score record keyed by `problem`.
pub fn normalize(value: Value, problem: &str) -> Result<ScoreRecord, UnrecognizedOutcome> {
    let record = match Outcome::try_from(value)? {
        Outcome::Bool(flag) => ScoreRecord::for_problem(bool_score(flag), problem),
        Outcome::Score(number) => ScoreRecord::for_problem(clamp(number), problem),
        Outcome::Record(fields) => from_record(fields, problem)?,
        Outcome::Capture(capture) => {
            let mut record = ScoreRecord::for_problem(bool_score(capture.passed()), problem);
            if !capture.passed() {
                record.insert_metadata(
                    "test_errors",
                    serde_json::Value::String(capture.to_string()),
                );
            }
            record
        }
    };
    Ok(record)
}

fn from_record(
    mut fields: BTreeMap<String, Value>,
    problem: &str,
) -> Result<ScoreRecord, UnrecognizedOutcome> {
    let Some(score) = fields.remove("score") else {
        let success = match fields.get("success") {
            Some(Value::Bool(flag)) => *flag,
            _ => false,
        };
        let mut record = ScoreRecord::for_problem(bool_score(success), problem);
        for (key, value) in &fields {
            record.insert_metadata(key.clone(), value.to_json());
        }
        return Ok(record);
    };
    let score = score.as_f64().ok_or(UnrecognizedOutcome {
        type_name: score.type_name(),
    })?;

    let mut record = ScoreRecord {
        score: clamp(score),
        subscores: number_map(fields.remove("subscores"))?,
        weights: number_map(fields.remove("weights"))?,
        metadata: None,
    };
    match fields.remove("metadata") {
        Some(Value::Record(meta)) => {
            for (key, value) in meta {
                record.insert_metadata(key, value.to_json());
            }
        }
        Some(Value::Nothing) | None => {}
        Some(other) => record.insert_metadata("metadata", other.to_json()),
    }
    for (key, value) in fields {
        record.insert_metadata(key, value.to_json());
    }
    record.fill_problem_entries(problem);
    Ok(record)
}

fn number_map(value: Option<Value>) -> Result<BTreeMap<String, f64>, UnrecognizedOutcome> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    let Value::Record(fields) = value else {
        return Err(UnrecognizedOutcome {
            type_name: value.type_name(),
        });
    };
    fields
        .into_iter()
        .map(|(key, value)| {
            value
                .as_f64()
                .map(|number| (key, number))
                .ok_or(UnrecognizedOutcome {
                    type_name: value.type_name(),
                })
        })
        .collect()
}

fn bool_score(flag: bool) -> f64 {
    if flag { 1.0 } else { 0.0 }
}

fn clamp(number: f64) -> f64 {
    if number.is_nan() {
        return 0.0;
    }
    number.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collector::Failure;

    fn record(pairs: &[(&str, Value)]) -> Value {
        Value::Record(
            pairs
                .iter()
                .map(|(key, value)| ((*key).to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn booleans_map_to_full_or_zero() {
        let pass = normalize(Value::Bool(true), "p").expect("normalize");
        assert_eq!(pass.score, 1.0);
        assert_eq!(pass.subscores["p"], 1.0);
        assert_eq!(pass.weights["p"], 1.0);
        assert_eq!(pass.metadata, None);

        let fail = normalize(Value::Bool(false), "p").expect("normalize");
        assert_eq!(fail.score, 0.0);
        assert_eq!(fail.subscores["p"], 0.0);
    }

    #[test]
    fn numbers_are_clamped() {
        assert_eq!(normalize(Value::Float(1.5), "p").expect("n").score, 1.0);
        assert_eq!(normalize(Value::Float(-0.2), "p").expect("n").score, 0.0);
        assert_eq!(normalize(Value::Float(0.25), "p").expect("n").score, 0.25);
        assert_eq!(normalize(Value::Int(1), "p").expect("n").score, 1.0);
        assert_eq!(normalize(Value::Float(f64::NAN), "p").expect("n").score, 0.0);
    }

    #[test]
    fn record_with_score_passes_through() {
        let value = record(&[
            ("score", Value::Float(0.5)),
            (
                "subscores",
                record(&[("p", Value::Float(0.75)), ("part", Value::Int(1))]),
            ),
            ("note", Value::str("half")),
        ]);
        let out = normalize(value, "p").expect("normalize");
        assert_eq!(out.score, 0.5);
        assert_eq!(out.subscores["p"], 0.75);
        assert_eq!(out.subscores["part"], 1.0);
        assert_eq!(out.weights["p"], 1.0);
        assert_eq!(out.metadata_str("note"), Some("half"));
    }

    #[test]
    fn record_score_is_clamped_and_extra_keys_move_into_metadata() {
        let value = record(&[
            ("score", Value::Float(1.5)),
            ("detail", Value::str("x")),
            ("metadata", record(&[("source", Value::str("rubric"))])),
        ]);
        let out = normalize(value, "p").expect("normalize");
        assert_eq!(out.score, 1.0);
        assert_eq!(out.subscores["p"], 1.0);
        assert_eq!(out.metadata_str("detail"), Some("x"));
        assert_eq!(out.metadata_str("source"), Some("rubric"));

        let out = normalize(record(&[("score", Value::Int(-2))]), "p").expect("normalize");
        assert_eq!(out.score, 0.0);
        assert_eq!(out.metadata, None);
    }

    #[test]
    fn record_without_score_uses_success() {
        let out = normalize(record(&[("success", Value::Bool(true))]), "p").expect("n");
        assert_eq!(out.score, 1.0);
        let out = normalize(record(&[("detail", Value::str("x"))]), "p").expect("n");
        assert_eq!(out.score, 0.0);
        assert_eq!(out.metadata_str("detail"), Some("x"));
    }

    #[test]
    fn failed_capture_carries_diagnostics() {
        let capture = Capture::Fail(Failure {
            expr: "answer == 4".to_string(),
            detail: "Evaluated: 5 == 4".to_string(),
        });
        let out = normalize(Value::Capture(capture), "p").expect("normalize");
        assert_eq!(out.score, 0.0);
        let diagnostics = out.metadata_str("test_errors").expect("diagnostics");
        assert!(diagnostics.contains("Evaluated: 5 == 4"));

        let out = normalize(Value::Capture(Capture::Pass), "p").expect("normalize");
        assert_eq!(out.score, 1.0);
        assert_eq!(out.metadata, None);
    }

    #[test]
    fn other_types_are_unrecognized() {
        let err = normalize(Value::str("4"), "p").expect_err("string");
        assert_eq!(err.type_name, "string");
        let err = normalize(record(&[("score", Value::str("high"))]), "p").expect_err("score");
        assert_eq!(err.type_name, "string");
    }

    #[test]
    fn serializes_without_absent_metadata() {
        let out = ScoreRecord::for_problem(1.0, "p");
        let json = serde_json::to_value(&out).expect("json");
        assert_eq!(
            json,
            serde_json::json!({ "score": 1.0, "subscores": { "p": 1.0 }, "weights": { "p": 1.0 } })
        );
        let zero = ScoreRecord::zero_with_error("p", "boom");
        assert_eq!(zero.metadata_str("error"), Some("boom"));
    }
}
