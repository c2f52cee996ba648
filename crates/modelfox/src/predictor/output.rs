//! Predict output schema and decoder
//!
//! Converts the evaluator's per-example records into [`PredictOutput`] values:
//! - Regression outputs carry the predicted value
//! - Binary classification outputs carry the chosen class and its probability
//! - Multiclass outputs additionally carry every class probability, and their
//!   feature contributions are explained per class

use super::features::{decode_feature_contributions, FeatureContributions};
use super::raw::RawPredictOutput;
use crate::error::{Error, Result};
use crate::models::Task;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance for multiclass probabilities summing to one
pub const PROBABILITY_EPSILON: f32 = 1e-3;

/// Output for a single input, tagged by the model's task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PredictOutput {
    Regression(RegressionPredictOutput),
    BinaryClassification(BinaryClassificationPredictOutput),
    MulticlassClassification(MulticlassClassificationPredictOutput),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionPredictOutput {
    pub value: f32,
    pub feature_contributions: Option<FeatureContributions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryClassificationPredictOutput {
    pub class_name: String,
    /// Probability of `class_name`, not of the positive class
    pub probability: f32,
    pub feature_contributions: Option<FeatureContributions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticlassClassificationPredictOutput {
    pub class_name: String,
    pub probability: f32,
    pub probabilities: BTreeMap<String, f32>,
    pub feature_contributions: Option<BTreeMap<String, FeatureContributions>>,
}

impl PredictOutput {
    pub fn task(&self) -> Task {
        match self {
            PredictOutput::Regression(_) => Task::Regression,
            PredictOutput::BinaryClassification(_) => Task::BinaryClassification,
            PredictOutput::MulticlassClassification(_) => Task::MulticlassClassification,
        }
    }

    pub fn has_feature_contributions(&self) -> bool {
        match self {
            PredictOutput::Regression(output) => output.feature_contributions.is_some(),
            PredictOutput::BinaryClassification(output) => output.feature_contributions.is_some(),
            PredictOutput::MulticlassClassification(output) => {
                output.feature_contributions.is_some()
            }
        }
    }

    /// Copy of this output with feature contributions removed
    pub fn without_feature_contributions(&self) -> PredictOutput {
        let mut output = self.clone();
        output.clear_feature_contributions();
        output
    }

    pub fn clear_feature_contributions(&mut self) {
        match self {
            PredictOutput::Regression(output) => output.feature_contributions = None,
            PredictOutput::BinaryClassification(output) => output.feature_contributions = None,
            PredictOutput::MulticlassClassification(output) => {
                output.feature_contributions = None
            }
        }
    }

    /// Short human readable summary, e.g. `Positive (87.1%)`
    pub fn summary(&self) -> String {
        match self {
            PredictOutput::Regression(output) => format!("{}", output.value),
            PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
                class_name,
                probability,
                ..
            })
            | PredictOutput::MulticlassClassification(MulticlassClassificationPredictOutput {
                class_name,
                probability,
                ..
            }) => format!("{} ({:.1}%)", class_name, probability * 100.0),
        }
    }
}

/// Decode one evaluator record for a model performing `task`
pub fn decode_predict_output(task: Task, raw: &RawPredictOutput) -> Result<PredictOutput> {
    let raw_task = Task::from_raw(raw.task)?;
    if raw_task != task {
        return Err(Error::schema(format!(
            "evaluator returned a {} output for a {} model",
            raw_task, task
        )));
    }

    let output = match task {
        Task::Regression => PredictOutput::Regression(RegressionPredictOutput {
            value: raw
                .value
                .ok_or_else(|| Error::schema("regression output is missing value"))?,
            feature_contributions: raw
                .feature_contributions
                .as_ref()
                .map(decode_feature_contributions)
                .transpose()?,
        }),
        Task::BinaryClassification => {
            PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
                class_name: class_name(raw)?,
                probability: probability(raw)?,
                feature_contributions: raw
                    .feature_contributions
                    .as_ref()
                    .map(decode_feature_contributions)
                    .transpose()?,
            })
        }
        Task::MulticlassClassification => {
            let probabilities = raw
                .probabilities
                .as_ref()
                .ok_or_else(|| Error::schema("multiclass output is missing probabilities"))?
                .iter()
                .map(|(class, probability)| (class.clone(), *probability))
                .collect::<BTreeMap<_, _>>();
            let feature_contributions = raw
                .class_feature_contributions
                .as_ref()
                .map(|contributions| {
                    contributions
                        .iter()
                        .map(|(class, contributions)| {
                            Ok((class.clone(), decode_feature_contributions(contributions)?))
                        })
                        .collect::<Result<BTreeMap<_, _>>>()
                })
                .transpose()?;
            PredictOutput::MulticlassClassification(MulticlassClassificationPredictOutput {
                class_name: class_name(raw)?,
                probability: probability(raw)?,
                probabilities,
                feature_contributions,
            })
        }
    };
    Ok(output)
}

fn class_name(raw: &RawPredictOutput) -> Result<String> {
    raw.class_name
        .clone()
        .ok_or_else(|| Error::schema("classification output is missing class_name"))
}

fn probability(raw: &RawPredictOutput) -> Result<f32> {
    raw.probability
        .ok_or_else(|| Error::schema("classification output is missing probability"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::features::FeatureContributionEntry;
    use crate::predictor::raw::RawFeatureContributions;

    fn contributions(baseline_value: f32, delta: f32) -> FeatureContributions {
        FeatureContributions {
            baseline_value,
            output_value: baseline_value + delta,
            entries: vec![FeatureContributionEntry::Identity {
                column_name: "sepal_length".to_string(),
                feature_value: 5.1,
                feature_contribution_value: delta,
            }],
        }
    }

    fn multiclass() -> PredictOutput {
        let probabilities = BTreeMap::from([
            ("Iris Setosa".to_string(), 0.9),
            ("Iris Versicolor".to_string(), 0.07),
            ("Iris Virginica".to_string(), 0.03),
        ]);
        let feature_contributions = probabilities
            .keys()
            .map(|class| (class.clone(), contributions(0.1, 0.2)))
            .collect();
        PredictOutput::MulticlassClassification(MulticlassClassificationPredictOutput {
            class_name: "Iris Setosa".to_string(),
            probability: 0.9,
            probabilities,
            feature_contributions: Some(feature_contributions),
        })
    }

    #[test]
    fn test_decode_is_inverse_of_encode() {
        let outputs = vec![
            PredictOutput::Regression(RegressionPredictOutput {
                value: 242_000.0,
                feature_contributions: Some(contributions(180_000.0, 62_000.0)),
            }),
            PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
                class_name: "Positive".to_string(),
                probability: 0.871,
                feature_contributions: None,
            }),
            multiclass(),
        ];
        for output in outputs {
            let raw = RawPredictOutput::from(&output);
            assert_eq!(decode_predict_output(output.task(), &raw).unwrap(), output);
        }
    }

    #[test]
    fn test_task_mismatch_is_schema_violation() {
        let raw = RawPredictOutput {
            task: crate::models::TASK_REGRESSION,
            value: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            decode_predict_output(Task::BinaryClassification, &raw),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_unknown_task_is_schema_violation() {
        let raw = RawPredictOutput {
            task: 9,
            ..Default::default()
        };
        assert!(matches!(
            decode_predict_output(Task::Regression, &raw),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_absent_contributions_are_not_an_error() {
        let raw = RawPredictOutput {
            task: crate::models::TASK_BINARY_CLASSIFICATION,
            class_name: Some("Negative".to_string()),
            probability: Some(0.6),
            ..Default::default()
        };
        let output = decode_predict_output(Task::BinaryClassification, &raw).unwrap();
        assert!(!output.has_feature_contributions());
    }

    #[test]
    fn test_bad_nested_contributions_fail_whole_output() {
        let mut raw = RawPredictOutput::from(&multiclass());
        if let Some(classes) = raw.class_feature_contributions.as_mut() {
            classes[1].1 = RawFeatureContributions {
                baseline_value: 0.0,
                output_value: 0.0,
                entries: vec![crate::predictor::raw::RawFeatureContributionEntry {
                    kind: 99,
                    ..Default::default()
                }],
            };
        }
        assert!(matches!(
            decode_predict_output(Task::MulticlassClassification, &raw),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_multiclass_invariants() {
        let output = multiclass();
        if let PredictOutput::MulticlassClassification(output) = &output {
            let total: f32 = output.probabilities.values().sum();
            assert!((total - 1.0).abs() < PROBABILITY_EPSILON);
            assert_eq!(output.probabilities[&output.class_name], output.probability);
            let max = output
                .probabilities
                .values()
                .cloned()
                .fold(f32::MIN, f32::max);
            assert_eq!(output.probability, max);
            let classes: Vec<_> = output.feature_contributions.as_ref().unwrap().keys().collect();
            let expected: Vec<_> = output.probabilities.keys().collect();
            assert_eq!(classes, expected);
        } else {
            panic!("expected multiclass output");
        }
    }

    #[test]
    fn test_wire_shape() {
        let output = PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
            class_name: "Positive".to_string(),
            probability: 0.5,
            feature_contributions: None,
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["type"], "binary_classification");
        assert_eq!(json["className"], "Positive");
        assert_eq!(json["probability"], 0.5);
        assert!(json["featureContributions"].is_null());

        let parsed: PredictOutput = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, output);
    }

    #[test]
    fn test_summary() {
        let output = PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
            class_name: "Positive".to_string(),
            probability: 0.871,
            feature_contributions: None,
        });
        assert_eq!(output.summary(), "Positive (87.1%)");
    }
}
