//! Loaded models and the predict protocol
//!
//! A [`Model`] owns one native model handle, the task it performs, and the log
//! queue for its events. Every predict call is normalized to a batch and sent to
//! the evaluator in a single call.

use crate::error::{Error, Result};
use crate::models::{PredictInput, PredictInputs, PredictOptions, PredictOutputs, Task};
use crate::observability::{ClientMetrics, StructuredLogger};
use crate::predictor::{decode_predict_output, NativeEvaluator, NativeModel, PredictOutput};
use crate::sync::{EventTransport, HttpTransport, LogQueue, TransportConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Options for loading a model
#[derive(Debug, Clone, Default)]
pub struct LoadModelOptions {
    /// Base URL of the app events are sent to, defaults to the hosted app
    pub modelfox_url: Option<String>,
    /// Timeout for requests to the app
    pub request_timeout: Option<Duration>,
}

pub struct Model {
    pub(crate) native: Box<dyn NativeModel>,
    pub(crate) task: Task,
    evaluator: Arc<dyn NativeEvaluator>,
    pub(crate) log_queue: LogQueue,
    pub(crate) transport: Arc<dyn EventTransport>,
    pub(crate) metrics: ClientMetrics,
    pub(crate) logger: StructuredLogger,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.native.id())
            .field("task", &self.task)
            .field("queued_events", &self.log_queue.len())
            .finish()
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        self.metrics.sub_queued_events(self.log_queue.len());
    }
}

impl Model {
    /// Load a model from its serialized bytes
    pub fn from_bytes(
        evaluator: Arc<dyn NativeEvaluator>,
        bytes: &[u8],
        options: LoadModelOptions,
    ) -> Result<Self> {
        let native = load_native(evaluator.as_ref(), bytes)?;
        let task = Task::from_raw(native.task())?;

        let mut transport_config = TransportConfig::default();
        if let Some(url) = options.modelfox_url {
            transport_config.base_url = url;
        }
        if let Some(timeout) = options.request_timeout {
            transport_config.timeout = timeout;
        }
        let transport = Arc::new(HttpTransport::new(transport_config)?);

        let logger = StructuredLogger::new("modelfox");
        logger.log_model_loaded(&native.id(), task.as_str(), "bytes");

        Ok(Self {
            native,
            task,
            evaluator,
            log_queue: LogQueue::new(),
            transport,
            metrics: ClientMetrics::new(),
            logger,
        })
    }

    /// Load a model from a file, reading its contents into memory
    pub fn from_path(
        evaluator: Arc<dyn NativeEvaluator>,
        path: impl AsRef<Path>,
        options: LoadModelOptions,
    ) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(evaluator, &bytes, options)
    }

    /// Replace the transport events are sent through
    pub fn with_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the native model with one loaded from `path`.
    ///
    /// The current model is kept if the new one fails to load. Queued events are
    /// kept either way.
    pub fn reload_from_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let old_id = self.native.id();
        let reloaded = std::fs::read(path).map_err(Error::from).and_then(|bytes| {
            let native = load_native(self.evaluator.as_ref(), &bytes)?;
            let task = Task::from_raw(native.task())?;
            Ok((native, task))
        });

        match reloaded {
            Ok((native, task)) => {
                self.native = native;
                self.task = task;
                self.logger
                    .log_model_reload(&old_id, Some(&self.native.id()), None);
                Ok(())
            }
            Err(e) => {
                self.logger
                    .log_model_reload(&old_id, None, Some(&e.to_string()));
                Err(e)
            }
        }
    }

    /// Identifier of the currently loaded model, read from the evaluator
    pub fn id(&self) -> String {
        self.native.id()
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Predict one input or a batch, returning outputs of the same shape
    pub fn predict_inputs(
        &self,
        inputs: PredictInputs,
        options: Option<&PredictOptions>,
    ) -> Result<PredictOutputs> {
        match inputs {
            PredictInputs::One(input) => self
                .predict_one(input, options)
                .map(PredictOutputs::One),
            PredictInputs::Many(inputs) => {
                self.predict(&inputs, options).map(PredictOutputs::Many)
            }
        }
    }

    pub fn predict_one(
        &self,
        input: PredictInput,
        options: Option<&PredictOptions>,
    ) -> Result<PredictOutput> {
        self.predict(std::slice::from_ref(&input), options)?
            .pop()
            .ok_or_else(|| Error::PredictionFailed("evaluator returned no output".to_string()))
    }

    /// Predict a batch with a single evaluator call
    pub fn predict(
        &self,
        inputs: &[PredictInput],
        options: Option<&PredictOptions>,
    ) -> Result<Vec<PredictOutput>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let default_options = PredictOptions::default();
        let options = options.unwrap_or(&default_options);

        let start = Instant::now();
        let result = self.predict_batch(inputs, options);
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());

        match &result {
            Ok(outputs) => {
                self.metrics.inc_predictions(outputs.len() as u64);
                debug!(
                    batch_size = inputs.len(),
                    task = %self.task,
                    elapsed_us = start.elapsed().as_micros(),
                    "Predicted batch"
                );
            }
            Err(e) => {
                self.metrics.inc_prediction_errors();
                debug!(batch_size = inputs.len(), error = %e, "Prediction failed");
            }
        }
        result
    }

    fn predict_batch(
        &self,
        inputs: &[PredictInput],
        options: &PredictOptions,
    ) -> Result<Vec<PredictOutput>> {
        let raw = self
            .native
            .predict_batch(inputs, options)
            .map_err(|e| Error::PredictionFailed(e.message))?;

        if raw.len() != inputs.len() {
            return Err(Error::PredictionFailed(format!(
                "evaluator returned {} outputs for {} inputs",
                raw.len(),
                inputs.len()
            )));
        }

        raw.iter()
            .map(|raw| {
                let mut output = decode_predict_output(self.task, raw)?;
                if !options.compute_feature_contributions {
                    output.clear_feature_contributions();
                } else if !output.has_feature_contributions() {
                    return Err(Error::schema(
                        "feature contributions were requested but not returned",
                    ));
                }
                Ok(output)
            })
            .collect()
    }
}

fn load_native(evaluator: &dyn NativeEvaluator, bytes: &[u8]) -> Result<Box<dyn NativeModel>> {
    evaluator
        .load_model(bytes)
        .map_err(|e| Error::ModelLoadFailed(e.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeError;
    use crate::models::TASK_BINARY_CLASSIFICATION;
    use crate::predict_input;
    use crate::predictor::{
        BinaryClassificationPredictOutput, FeatureContributionEntry, FeatureContributions,
        RawPredictOutput,
    };
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Binary classifier whose positive probability is the `age` column divided by 100
    struct AgeModel {
        id: String,
        calls: Arc<AtomicUsize>,
        extra_output: bool,
        contributions: bool,
    }

    impl NativeModel for AgeModel {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn task(&self) -> u32 {
            TASK_BINARY_CLASSIFICATION
        }

        fn predict_batch(
            &self,
            inputs: &[PredictInput],
            options: &PredictOptions,
        ) -> std::result::Result<Vec<RawPredictOutput>, NativeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outputs = Vec::new();
            for input in inputs {
                let age = input
                    .get("age")
                    .and_then(|v| v.as_number())
                    .ok_or_else(|| NativeError::new("age is required"))?
                    as f32;
                let positive = age / 100.0;
                let (class_name, probability) = if positive >= options.threshold {
                    ("Positive", positive)
                } else {
                    ("Negative", 1.0 - positive)
                };
                let output =
                    PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
                        class_name: class_name.to_string(),
                        probability,
                        feature_contributions: self.contributions.then(|| FeatureContributions {
                            baseline_value: 0.0,
                            output_value: age,
                            entries: vec![FeatureContributionEntry::Identity {
                                column_name: "age".to_string(),
                                feature_value: age,
                                feature_contribution_value: age,
                            }],
                        }),
                    });
                outputs.push(RawPredictOutput::from(&output));
            }
            if self.extra_output {
                outputs.push(outputs[0].clone());
            }
            Ok(outputs)
        }
    }

    struct AgeEvaluator {
        calls: Arc<AtomicUsize>,
        extra_output: bool,
        contributions: bool,
    }

    impl NativeEvaluator for AgeEvaluator {
        fn load_model(
            &self,
            bytes: &[u8],
        ) -> std::result::Result<Box<dyn NativeModel>, NativeError> {
            if bytes.is_empty() {
                return Err(NativeError::new("empty model"));
            }
            Ok(Box::new(AgeModel {
                id: String::from_utf8_lossy(bytes).into_owned(),
                calls: self.calls.clone(),
                extra_output: self.extra_output,
                contributions: self.contributions,
            }))
        }
    }

    fn evaluator(contributions: bool) -> (Arc<dyn NativeEvaluator>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let evaluator = Arc::new(AgeEvaluator {
            calls: calls.clone(),
            extra_output: false,
            contributions,
        });
        (evaluator, calls)
    }

    fn model(contributions: bool) -> (Model, Arc<AtomicUsize>) {
        let (evaluator, calls) = evaluator(contributions);
        let model = Model::from_bytes(evaluator, b"heart-disease", LoadModelOptions::default())
            .unwrap();
        (model, calls)
    }

    #[test]
    fn test_batch_shape_is_preserved_with_one_call() {
        let (model, calls) = model(false);
        let inputs: Vec<PredictInput> = (20..30).map(|age| predict_input! { "age": age }).collect();

        let outputs = model
            .predict_inputs(PredictInputs::Many(inputs), None)
            .unwrap();
        assert_eq!(outputs.len(), 10);
        assert!(matches!(outputs, PredictOutputs::Many(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let output = model
            .predict_inputs(PredictInputs::One(predict_input! { "age": 63 }), None)
            .unwrap();
        assert!(matches!(output, PredictOutputs::One(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_batch_skips_evaluator() {
        let (model, calls) = model(false);
        assert!(model.predict(&[], None).unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_threshold_changes_class() {
        let (model, _) = model(false);
        let input = predict_input! { "age": 30 };

        let output = model.predict_one(input.clone(), None).unwrap();
        assert_eq!(output.summary(), "Negative (70.0%)");

        let options = PredictOptions {
            threshold: 0.25,
            compute_feature_contributions: false,
        };
        match model.predict_one(input, Some(&options)).unwrap() {
            PredictOutput::BinaryClassification(output) => {
                assert_eq!(output.class_name, "Positive");
                assert!((output.probability - 0.3).abs() < 1e-6);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_contributions_gating() {
        let (model, _) = model(true);
        let input = predict_input! { "age": 63 };

        let output = model.predict_one(input.clone(), None).unwrap();
        assert!(!output.has_feature_contributions());

        let options = PredictOptions {
            compute_feature_contributions: true,
            ..Default::default()
        };
        let output = model.predict_one(input.clone(), Some(&options)).unwrap();
        assert!(output.has_feature_contributions());

        let (model, _) = self::model(false);
        assert!(matches!(
            model.predict_one(input, Some(&options)),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_evaluator_failure_fails_whole_batch() {
        let (model, _) = model(false);
        let inputs = vec![predict_input! { "age": 40 }, predict_input! { "gender": "male" }];
        match model.predict(&inputs, None) {
            Err(Error::PredictionFailed(message)) => assert_eq!(message, "age is required"),
            other => panic!("expected prediction failure, got {:?}", other),
        }
    }

    #[test]
    fn test_output_count_mismatch_is_prediction_failure() {
        let evaluator = Arc::new(AgeEvaluator {
            calls: Arc::new(AtomicUsize::new(0)),
            extra_output: true,
            contributions: false,
        });
        let model = Model::from_bytes(evaluator, b"m", LoadModelOptions::default()).unwrap();
        assert!(matches!(
            model.predict_one(predict_input! { "age": 40 }, None),
            Err(Error::PredictionFailed(_))
        ));
    }

    #[test]
    fn test_load_failure() {
        let (evaluator, _) = evaluator(false);
        assert!(matches!(
            Model::from_bytes(evaluator, b"", LoadModelOptions::default()),
            Err(Error::ModelLoadFailed(_))
        ));
    }

    #[test]
    fn test_from_path_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"v1").unwrap();

        let (evaluator, _) = evaluator(false);
        let mut model = Model::from_path(evaluator, &path, LoadModelOptions::default()).unwrap();
        assert_eq!(model.id(), "v1");

        let mut file = File::create(&path).unwrap();
        file.write_all(b"v2").unwrap();
        drop(file);
        model.reload_from_path(&path).unwrap();
        assert_eq!(model.id(), "v2");

        // An empty file fails to load and the previous model stays active
        File::create(&path).unwrap();
        assert!(model.reload_from_path(&path).is_err());
        assert_eq!(model.id(), "v2");

        assert!(matches!(
            model.reload_from_path(dir.path().join("missing.bin")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_reload_after_truncation_in_place() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        std::fs::write(&path, b"v3-with-a-long-tail").unwrap();

        let (evaluator, _) = evaluator(false);
        let mut model = Model::from_path(evaluator, &path, LoadModelOptions::default()).unwrap();
        assert_eq!(model.id(), "v3-with-a-long-tail");

        // Shrink the file through an open handle, as a writer mid-replace would
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(2).unwrap();
        model.reload_from_path(&path).unwrap();
        assert_eq!(model.id(), "v3");

        file.set_len(0).unwrap();
        assert!(matches!(
            model.reload_from_path(&path),
            Err(Error::ModelLoadFailed(_))
        ));
        assert_eq!(model.id(), "v3");
    }

    #[test]
    fn test_invalid_modelfox_url() {
        let (evaluator, _) = evaluator(false);
        let options = LoadModelOptions {
            modelfox_url: Some("::".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Model::from_bytes(evaluator, b"m", options),
            Err(Error::LogTransportFailed { status: None, .. })
        ));
    }
}
