//! ONNX model evaluation using tract
//!
//! An ONNX model is paired with a [`ModelManifest`] describing its input columns
//! and classes. Columns are expanded into features in manifest order:
//! - a number column becomes one identity feature
//! - an enum column becomes one one-hot feature for unknown values, then one per variant
//!
//! Output 0 holds the predictions. An optional output 1 holds per-feature
//! contributions with the bias in the last column of each block.

use super::raw::{
    RawFeatureContributionEntry, RawFeatureContributions, RawPredictOutput, ENTRY_IDENTITY,
    ENTRY_ONE_HOT_ENCODED,
};
use super::{NativeEvaluator, NativeModel};
use crate::error::{Error, NativeError, Result};
use crate::models::{PredictInput, PredictInputValue, PredictOptions, Task};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Batch latency above which a warning is logged
const SLOW_BATCH_MS: u128 = 50;

/// Length of the model id derived from the model bytes
const MODEL_ID_LEN: usize = 32;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Which evaluator implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    #[default]
    Onnx,
}

impl FromStr for EvaluatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(EvaluatorKind::Onnx),
            other => Err(Error::ModelLoadFailed(format!(
                "unknown evaluator '{}'",
                other
            ))),
        }
    }
}

/// Build the evaluator selected in configuration
pub fn evaluator_from_config(
    kind: EvaluatorKind,
    manifest_path: &Path,
) -> Result<Arc<dyn NativeEvaluator>> {
    match kind {
        EvaluatorKind::Onnx => {
            let manifest = ModelManifest::from_path(manifest_path)?;
            info!(
                evaluator = "onnx",
                manifest = %manifest_path.display(),
                task = %manifest.task,
                columns = manifest.columns.len(),
                "Evaluator configured"
            );
            Ok(Arc::new(OnnxEvaluator::new(manifest)?))
        }
    }
}

/// Describes the inputs and outputs of an ONNX model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default)]
    pub id: Option<String>,
    pub task: Task,
    pub columns: Vec<ColumnManifest>,
    #[serde(default)]
    pub negative_class: Option<String>,
    #[serde(default)]
    pub positive_class: Option<String>,
    /// Multiclass class names in output column order
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnManifest {
    Number { name: String },
    Enum { name: String, variants: Vec<String> },
}

impl ColumnManifest {
    pub fn name(&self) -> &str {
        match self {
            ColumnManifest::Number { name } | ColumnManifest::Enum { name, .. } => name,
        }
    }

    fn feature_count(&self) -> usize {
        match self {
            ColumnManifest::Number { .. } => 1,
            ColumnManifest::Enum { variants, .. } => 1 + variants.len(),
        }
    }
}

impl ModelManifest {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: ModelManifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check that the classes required by the task are present
    pub fn validate(&self) -> Result<()> {
        match self.task {
            Task::Regression => Ok(()),
            Task::BinaryClassification => {
                if self.negative_class.is_none() || self.positive_class.is_none() {
                    return Err(Error::ModelLoadFailed(
                        "binary classifiers need negative_class and positive_class".to_string(),
                    ));
                }
                Ok(())
            }
            Task::MulticlassClassification => {
                if self.classes.len() < 2 {
                    return Err(Error::ModelLoadFailed(
                        "multiclass classifiers need at least two classes".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Total number of features fed to the model
    pub fn feature_count(&self) -> usize {
        self.columns.iter().map(ColumnManifest::feature_count).sum()
    }

    /// Number of values per example in output 0
    fn class_count(&self) -> usize {
        match self.task {
            Task::Regression | Task::BinaryClassification => 1,
            Task::MulticlassClassification => self.classes.len(),
        }
    }

    /// Expand a batch of inputs into a row-major `[n, F]` feature matrix
    fn encode_inputs(&self, inputs: &[PredictInput]) -> Vec<f32> {
        let mut data = Vec::with_capacity(inputs.len() * self.feature_count());
        for input in inputs {
            for column in &self.columns {
                match column {
                    ColumnManifest::Number { name } => {
                        data.push(number_value(input.get(name)));
                    }
                    ColumnManifest::Enum { name, variants } => {
                        let slot = enum_slot(variants, input.get(name));
                        data.extend(
                            (0..=variants.len()).map(|i| if i == slot { 1.0 } else { 0.0 }),
                        );
                    }
                }
            }
        }
        data
    }

    /// Build one block of contribution entries for a single input
    fn contribution_entries(
        &self,
        input: &PredictInput,
        contributions: &[f32],
    ) -> Vec<RawFeatureContributionEntry> {
        let mut entries = Vec::with_capacity(self.feature_count());
        let mut feature = 0;
        for column in &self.columns {
            match column {
                ColumnManifest::Number { name } => {
                    let value = number_value(input.get(name));
                    entries.push(RawFeatureContributionEntry {
                        kind: ENTRY_IDENTITY,
                        column_name: Some(name.clone()),
                        // Absent values are reported as zero so the record stays JSON encodable
                        feature_value: Some(if value.is_finite() { value } else { 0.0 }),
                        feature_contribution_value: contributions[feature],
                        ..Default::default()
                    });
                    feature += 1;
                }
                ColumnManifest::Enum { name, variants } => {
                    let slot = enum_slot(variants, input.get(name));
                    for i in 0..=variants.len() {
                        entries.push(RawFeatureContributionEntry {
                            kind: ENTRY_ONE_HOT_ENCODED,
                            column_name: Some(name.clone()),
                            variant: if i == 0 {
                                None
                            } else {
                                Some(variants[i - 1].clone())
                            },
                            feature_value: Some(if i == slot { 1.0 } else { 0.0 }),
                            feature_contribution_value: contributions[feature],
                            ..Default::default()
                        });
                        feature += 1;
                    }
                }
            }
        }
        entries
    }

    fn raw_contributions(&self, input: &PredictInput, block: &[f32]) -> RawFeatureContributions {
        let features = self.feature_count();
        let baseline_value = block[features];
        let entries = self.contribution_entries(input, &block[..features]);
        let output_value = baseline_value
            + entries
                .iter()
                .map(|entry| entry.feature_contribution_value)
                .sum::<f32>();
        RawFeatureContributions {
            baseline_value,
            output_value,
            entries,
        }
    }

    /// Turn the model's output rows into one raw record per input
    fn decode_outputs(
        &self,
        inputs: &[PredictInput],
        predictions: &[f32],
        prediction_width: usize,
        contributions: Option<&[f32]>,
        options: &PredictOptions,
    ) -> anyhow::Result<Vec<RawPredictOutput>> {
        let features = self.feature_count();
        let block = features + 1;
        let mut outputs = Vec::with_capacity(inputs.len());

        for (row, input) in inputs.iter().enumerate() {
            let prediction = &predictions[row * prediction_width..(row + 1) * prediction_width];
            let contribution_row = contributions.map(|c| {
                let width = self.class_count() * block;
                &c[row * width..(row + 1) * width]
            });

            let output = match self.task {
                Task::Regression => RawPredictOutput {
                    task: self.task.to_raw(),
                    value: Some(prediction[0]),
                    feature_contributions: contribution_row
                        .map(|c| self.raw_contributions(input, c)),
                    ..Default::default()
                },
                Task::BinaryClassification => {
                    let positive = prediction[prediction_width - 1];
                    let (probability, class_name) = if positive >= options.threshold {
                        (positive, self.positive_class.clone())
                    } else {
                        (1.0 - positive, self.negative_class.clone())
                    };
                    RawPredictOutput {
                        task: self.task.to_raw(),
                        class_name,
                        probability: Some(probability),
                        feature_contributions: contribution_row
                            .map(|c| self.raw_contributions(input, c)),
                        ..Default::default()
                    }
                }
                Task::MulticlassClassification => {
                    let mut best = 0;
                    for (i, probability) in prediction.iter().enumerate() {
                        if *probability > prediction[best] {
                            best = i;
                        }
                    }
                    RawPredictOutput {
                        task: self.task.to_raw(),
                        class_name: Some(self.classes[best].clone()),
                        probability: Some(prediction[best]),
                        probabilities: Some(
                            self.classes
                                .iter()
                                .cloned()
                                .zip(prediction.iter().copied())
                                .collect(),
                        ),
                        class_feature_contributions: contribution_row.map(|c| {
                            self.classes
                                .iter()
                                .enumerate()
                                .map(|(i, class)| {
                                    let row = &c[i * block..(i + 1) * block];
                                    (class.clone(), self.raw_contributions(input, row))
                                })
                                .collect()
                        }),
                        ..Default::default()
                    }
                }
            };
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn prediction_width(&self, values: usize, rows: usize) -> anyhow::Result<usize> {
        if rows == 0 || values % rows != 0 {
            anyhow::bail!("Model output has {} values for {} inputs", values, rows);
        }
        let width = values / rows;
        let valid = match self.task {
            Task::Regression => width == 1,
            Task::BinaryClassification => width == 1 || width == 2,
            Task::MulticlassClassification => width == self.classes.len(),
        };
        if !valid {
            anyhow::bail!(
                "Model output has {} values per input, which does not fit a {} model",
                width,
                self.task
            );
        }
        Ok(width)
    }
}

fn number_value(value: Option<&PredictInputValue>) -> f32 {
    match value {
        Some(PredictInputValue::Number(value)) => *value as f32,
        Some(PredictInputValue::String(value)) => value.trim().parse().unwrap_or(f32::NAN),
        None => f32::NAN,
    }
}

/// One-hot slot for an enum value, 0 when absent or not a known variant
fn enum_slot(variants: &[String], value: Option<&PredictInputValue>) -> usize {
    let value = match value {
        Some(PredictInputValue::String(value)) => value.clone(),
        Some(PredictInputValue::Number(value)) => value.to_string(),
        None => return 0,
    };
    variants
        .iter()
        .position(|variant| *variant == value)
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// First characters of the hex SHA-256 of the model bytes
pub fn compute_model_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut id = hex::encode(hasher.finalize());
    id.truncate(MODEL_ID_LEN);
    id
}

/// Evaluator that loads ONNX models described by a manifest
pub struct OnnxEvaluator {
    manifest: Arc<ModelManifest>,
}

impl OnnxEvaluator {
    pub fn new(manifest: ModelManifest) -> Result<Self> {
        manifest.validate()?;
        Ok(Self {
            manifest: Arc::new(manifest),
        })
    }
}

impl NativeEvaluator for OnnxEvaluator {
    fn load_model(&self, bytes: &[u8]) -> std::result::Result<Box<dyn NativeModel>, NativeError> {
        Ok(Box::new(OnnxModel::load(self.manifest.clone(), bytes)?))
    }
}

/// A parsed ONNX model compiled into one plan with a symbolic batch dimension
pub struct OnnxModel {
    id: String,
    manifest: Arc<ModelManifest>,
    has_contributions: bool,
    plan: TractModel,
}

impl OnnxModel {
    fn load(manifest: Arc<ModelManifest>, bytes: &[u8]) -> anyhow::Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .context("Failed to parse ONNX model")?;
        let id = manifest
            .id
            .clone()
            .unwrap_or_else(|| compute_model_id(bytes));
        Self::from_inference_model(id, manifest, model)
    }

    fn from_inference_model(
        id: String,
        manifest: Arc<ModelManifest>,
        model: InferenceModel,
    ) -> anyhow::Result<Self> {
        let has_contributions = model.outputs.len() > 1;
        let batch = model.sym("N");
        let plan = model
            .with_input_fact(
                0,
                f32::fact([TDim::from(batch), TDim::from(manifest.feature_count())]).into(),
            )
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        debug!(
            model_id = %id,
            task = %manifest.task,
            features = manifest.feature_count(),
            has_contributions = has_contributions,
            "ONNX model compiled"
        );

        Ok(Self {
            id,
            manifest,
            has_contributions,
            plan,
        })
    }

    fn run(
        &self,
        inputs: &[PredictInput],
        options: &PredictOptions,
    ) -> anyhow::Result<Vec<RawPredictOutput>> {
        if options.compute_feature_contributions && !self.has_contributions {
            anyhow::bail!("Model does not output feature contributions");
        }

        let start = Instant::now();
        let rows = inputs.len();
        let features = self.manifest.feature_count();
        let data = self.manifest.encode_inputs(inputs);
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((rows, features), data)
            .context("Failed to shape input tensor")?
            .into();

        let result = self.plan.run(tvec!(input.into()))?;

        let predictions: Vec<f32> = result
            .first()
            .context("No output from model")?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();
        let prediction_width = self.manifest.prediction_width(predictions.len(), rows)?;

        let contributions: Option<Vec<f32>> = if options.compute_feature_contributions {
            let values: Vec<f32> = result
                .get(1)
                .context("No feature contribution output from model")?
                .to_array_view::<f32>()?
                .iter()
                .copied()
                .collect();
            let expected = rows * self.manifest.class_count() * (features + 1);
            if values.len() != expected {
                anyhow::bail!(
                    "Feature contribution output has {} values, expected {}",
                    values.len(),
                    expected
                );
            }
            Some(values)
        } else {
            None
        };

        let outputs = self.manifest.decode_outputs(
            inputs,
            &predictions,
            prediction_width,
            contributions.as_deref(),
            options,
        )?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > SLOW_BATCH_MS {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                batch_size = rows,
                "Inference exceeded {}ms",
                SLOW_BATCH_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros(), batch_size = rows, "Inference completed");
        }
        Ok(outputs)
    }
}

impl NativeModel for OnnxModel {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn task(&self) -> u32 {
        self.manifest.task.to_raw()
    }

    fn predict_batch(
        &self,
        inputs: &[PredictInput],
        options: &PredictOptions,
    ) -> std::result::Result<Vec<RawPredictOutput>, NativeError> {
        Ok(self.run(inputs, options)?)
    }
}
