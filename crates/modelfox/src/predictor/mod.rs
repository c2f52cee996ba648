//! Prediction result schema and the evaluator boundary
//!
//! This module provides:
//! - The typed [`PredictOutput`] and [`FeatureContributions`] schema
//! - Decoders from the evaluator's raw records into that schema
//! - The [`NativeEvaluator`] and [`NativeModel`] traits the client calls through
//! - An ONNX evaluator built on tract

mod features;
mod inference;
mod output;
pub mod raw;

pub use features::{
    decode_entry, decode_feature_contributions, decode_ngram, FeatureContributionEntry,
    FeatureContributions, NGram, DECOMPOSITION_EPSILON,
};
pub use inference::{
    evaluator_from_config, ColumnManifest, EvaluatorKind, ModelManifest, OnnxEvaluator,
    OnnxModel,
};
pub use output::{
    decode_predict_output, BinaryClassificationPredictOutput,
    MulticlassClassificationPredictOutput, PredictOutput, RegressionPredictOutput,
    PROBABILITY_EPSILON,
};
pub use raw::{RawFeatureContributionEntry, RawFeatureContributions, RawNGram, RawPredictOutput};

use crate::error::NativeError;
use crate::models::{PredictInput, PredictOptions};

/// Loads models from their serialized bytes
pub trait NativeEvaluator: Send + Sync {
    fn load_model(&self, bytes: &[u8]) -> Result<Box<dyn NativeModel>, NativeError>;
}

/// A loaded model, able to evaluate a whole batch in one call
pub trait NativeModel: Send + Sync {
    /// Stable identifier of the model
    fn id(&self) -> String;

    /// Task discriminant, see [`crate::models::TASK_REGRESSION`] and friends
    fn task(&self) -> u32;

    /// Evaluate every input, returning exactly one record per input in order
    fn predict_batch(
        &self,
        inputs: &[PredictInput],
        options: &PredictOptions,
    ) -> Result<Vec<RawPredictOutput>, NativeError>;
}
