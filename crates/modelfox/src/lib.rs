//! ModelFox client library
//!
//! This crate provides the core functionality for:
//! - Loading models through an evaluator and making predictions
//! - Decoding prediction outputs and feature contributions
//! - Queueing prediction and true value events and sending them to the app
//! - Observability for all of the above

pub mod error;
pub mod model;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod sync;

pub use error::{Error, NativeError, Result};
pub use model::{LoadModelOptions, Model};
pub use models::*;
pub use observability::{ClientMetrics, StructuredLogger};
pub use predictor::{
    BinaryClassificationPredictOutput, FeatureContributionEntry, FeatureContributions,
    MulticlassClassificationPredictOutput, NGram, NativeEvaluator, NativeModel, PredictOutput,
    RegressionPredictOutput,
};
pub use sync::{Event, LogPredictionArgs, LogTrueValueArgs};
