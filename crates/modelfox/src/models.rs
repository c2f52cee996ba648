//! Core data models shared by prediction and event logging

use crate::error::{Error, Result};
use crate::predictor::PredictOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw task discriminants reported by the evaluator
pub const TASK_REGRESSION: u32 = 0;
pub const TASK_BINARY_CLASSIFICATION: u32 = 1;
pub const TASK_MULTICLASS_CLASSIFICATION: u32 = 2;

/// The task a model performs, fixed when the model is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Regression,
    BinaryClassification,
    MulticlassClassification,
}

impl Task {
    /// Decode the evaluator's task discriminant
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            TASK_REGRESSION => Ok(Task::Regression),
            TASK_BINARY_CLASSIFICATION => Ok(Task::BinaryClassification),
            TASK_MULTICLASS_CLASSIFICATION => Ok(Task::MulticlassClassification),
            other => Err(Error::schema(format!("unknown task type {}", other))),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            Task::Regression => TASK_REGRESSION,
            Task::BinaryClassification => TASK_BINARY_CLASSIFICATION,
            Task::MulticlassClassification => TASK_MULTICLASS_CLASSIFICATION,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Regression => "regression",
            Task::BinaryClassification => "binary_classification",
            Task::MulticlassClassification => "multiclass_classification",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single value in a predict input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictInputValue {
    Number(f64),
    String(String),
}

impl PredictInputValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PredictInputValue::Number(value) => Some(*value),
            PredictInputValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PredictInputValue::String(value) => Some(value.as_str()),
            PredictInputValue::Number(_) => None,
        }
    }
}

impl From<f64> for PredictInputValue {
    fn from(value: f64) -> Self {
        PredictInputValue::Number(value)
    }
}

impl From<f32> for PredictInputValue {
    fn from(value: f32) -> Self {
        PredictInputValue::Number(f64::from(value))
    }
}

impl From<i32> for PredictInputValue {
    fn from(value: i32) -> Self {
        PredictInputValue::Number(f64::from(value))
    }
}

impl From<u32> for PredictInputValue {
    fn from(value: u32) -> Self {
        PredictInputValue::Number(f64::from(value))
    }
}

impl From<String> for PredictInputValue {
    fn from(value: String) -> Self {
        PredictInputValue::String(value)
    }
}

impl From<&str> for PredictInputValue {
    fn from(value: &str) -> Self {
        PredictInputValue::String(value.to_owned())
    }
}

/// Input to a prediction, keyed by the column names the model was trained with.
///
/// Absent values are represented by leaving the column out. When deserializing,
/// `null` values are treated the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Option<PredictInputValue>>")]
pub struct PredictInput(pub BTreeMap<String, PredictInputValue>);

impl From<BTreeMap<String, Option<PredictInputValue>>> for PredictInput {
    fn from(values: BTreeMap<String, Option<PredictInputValue>>) -> Self {
        PredictInput(
            values
                .into_iter()
                .filter_map(|(column, value)| value.map(|value| (column, value)))
                .collect(),
        )
    }
}

impl PredictInput {
    pub fn new() -> Self {
        PredictInput(BTreeMap::new())
    }

    /// Set a column value, replacing any previous value
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<PredictInputValue>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&PredictInputValue> {
        self.0.get(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for PredictInput
where
    K: Into<String>,
    V: Into<PredictInputValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        PredictInput(
            iter.into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        )
    }
}

/// Build a [`PredictInput`] from `"column": value` pairs
#[macro_export]
macro_rules! predict_input {
    ($($column:literal : $value:expr),* $(,)?) => {{
        let mut input = $crate::PredictInput::new();
        $(input.insert($column, $value);)*
        input
    }};
}

/// Options for a predict call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PredictOptions {
    /// Decision threshold for binary classifiers
    pub threshold: f32,
    /// Populate `feature_contributions` on every output
    pub compute_feature_contributions: bool,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            compute_feature_contributions: false,
        }
    }
}

/// One input or a batch of inputs. The output of a predict call has the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictInputs {
    Many(Vec<PredictInput>),
    One(PredictInput),
}

impl From<PredictInput> for PredictInputs {
    fn from(input: PredictInput) -> Self {
        PredictInputs::One(input)
    }
}

impl From<Vec<PredictInput>> for PredictInputs {
    fn from(inputs: Vec<PredictInput>) -> Self {
        PredictInputs::Many(inputs)
    }
}

/// Outputs mirroring the shape of [`PredictInputs`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictOutputs {
    Many(Vec<PredictOutput>),
    One(PredictOutput),
}

impl PredictOutputs {
    pub fn len(&self) -> usize {
        match self {
            PredictOutputs::Many(outputs) => outputs.len(),
            PredictOutputs::One(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<PredictOutput> {
        match self {
            PredictOutputs::Many(outputs) => outputs,
            PredictOutputs::One(output) => vec![output],
        }
    }
}

/// A caller supplied identifier or true value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    String(String),
}

impl From<f64> for NumberOrString {
    fn from(value: f64) -> Self {
        NumberOrString::Number(value)
    }
}

impl From<i32> for NumberOrString {
    fn from(value: i32) -> Self {
        NumberOrString::Number(f64::from(value))
    }
}

impl From<String> for NumberOrString {
    fn from(value: String) -> Self {
        NumberOrString::String(value)
    }
}

impl From<&str> for NumberOrString {
    fn from(value: &str) -> Self {
        NumberOrString::String(value.to_owned())
    }
}

impl std::fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberOrString::Number(value) => write!(f, "{}", value),
            NumberOrString::String(value) => f.write_str(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_raw_round_trip_and_unknown() {
        for task in [
            Task::Regression,
            Task::BinaryClassification,
            Task::MulticlassClassification,
        ] {
            assert_eq!(Task::from_raw(task.to_raw()).unwrap(), task);
        }
        assert!(matches!(Task::from_raw(7), Err(Error::SchemaViolation(_))));
    }

    #[test]
    fn test_predict_input_drops_null_values() {
        let input: PredictInput =
            serde_json::from_str(r#"{"age": 63, "gender": "male", "cholesterol": null}"#)
                .unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input.get("age"), Some(&PredictInputValue::Number(63.0)));
        assert_eq!(input.get("gender").and_then(|v| v.as_str()), Some("male"));
        assert!(input.get("cholesterol").is_none());
    }

    #[test]
    fn test_predict_input_macro() {
        let input = predict_input! {
            "age": 63.0,
            "chest_pain": "typical angina",
        };
        assert_eq!(input.len(), 2);
        assert_eq!(input.get("age").and_then(|v| v.as_number()), Some(63.0));
    }

    #[test]
    fn test_predict_options_defaults_and_camel_case() {
        let options: PredictOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PredictOptions::default());
        assert_eq!(options.threshold, 0.5);

        let options: PredictOptions =
            serde_json::from_str(r#"{"threshold": 0.25, "computeFeatureContributions": true}"#)
                .unwrap();
        assert_eq!(options.threshold, 0.25);
        assert!(options.compute_feature_contributions);
    }

    #[test]
    fn test_predict_inputs_shape() {
        let one: PredictInputs = serde_json::from_str(r#"{"age": 1}"#).unwrap();
        assert!(matches!(one, PredictInputs::One(_)));

        let many: PredictInputs = serde_json::from_str(r#"[{"age": 1}, {"age": 2}]"#).unwrap();
        match many {
            PredictInputs::Many(inputs) => assert_eq!(inputs.len(), 2),
            PredictInputs::One(_) => panic!("expected a batch"),
        }
    }

    #[test]
    fn test_number_or_string_untagged() {
        assert_eq!(serde_json::to_string(&NumberOrString::from(3.0)).unwrap(), "3.0");
        assert_eq!(
            serde_json::to_string(&NumberOrString::from("abc")).unwrap(),
            "\"abc\""
        );
    }
}
