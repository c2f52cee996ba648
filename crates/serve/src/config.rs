//! Sidecar configuration
//!
//! Read from an optional `modelfox` config file and `MODELFOX_*` environment
//! variables, e.g. `MODELFOX_MODEL_PATH=heart_disease.onnx`.

use anyhow::{Context, Result};
use modelfox::predictor::EvaluatorKind;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
    /// Serialized model file
    pub model_path: PathBuf,

    /// Model manifest, defaults to the model path with a `.json` extension
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,

    #[serde(default = "default_evaluator")]
    pub evaluator: String,

    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the app events are sent to
    #[serde(default)]
    pub modelfox_url: Option<String>,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Reload the model when its file changes
    #[serde(default)]
    pub watch_model: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_evaluator() -> String {
    "onnx".to_string()
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_flush_interval() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl ServeConfig {
    /// Load configuration from the environment and an optional config file
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("modelfox").required(false))
            .add_source(config::Environment::with_prefix("MODELFOX"))
            .build()
            .context("Failed to read configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let config: ServeConfig = config
            .try_deserialize()
            .context("Invalid configuration, MODELFOX_MODEL_PATH is required")?;
        config.evaluator_kind()?;
        Ok(config)
    }

    pub fn evaluator_kind(&self) -> Result<EvaluatorKind> {
        self.evaluator
            .parse()
            .with_context(|| format!("Unknown evaluator '{}'", self.evaluator))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.model_path.with_extension("json"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
