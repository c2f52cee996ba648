//! Events recorded for the tracking endpoint

use crate::models::{NumberOrString, PredictInput, PredictOptions};
use crate::predictor::PredictOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single event, serialized with a `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Prediction(PredictionEvent),
    TrueValue(TrueValueEvent),
}

impl Event {
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            Event::Prediction(event) => event.date,
            Event::TrueValue(event) => event.date,
        }
    }

    pub fn model_id(&self) -> &str {
        match self {
            Event::Prediction(event) => &event.model_id,
            Event::TrueValue(event) => &event.model_id,
        }
    }

    pub fn is_prediction(&self) -> bool {
        matches!(self, Event::Prediction(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionEvent {
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<NumberOrString>,
    pub input: PredictInput,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PredictOptions>,
    /// Always recorded without feature contributions
    pub output: PredictOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrueValueEvent {
    pub date: DateTime<Utc>,
    pub identifier: NumberOrString,
    pub model_id: String,
    pub true_value: NumberOrString,
}

/// Arguments for logging a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPredictionArgs {
    #[serde(default)]
    pub identifier: Option<NumberOrString>,
    pub input: PredictInput,
    #[serde(default)]
    pub options: Option<PredictOptions>,
    pub output: PredictOutput,
}

/// Arguments for logging the true value of an earlier prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTrueValueArgs {
    pub identifier: NumberOrString,
    pub true_value: NumberOrString,
}

impl Event {
    /// Build a prediction event, dropping any feature contributions from the output
    pub fn prediction(model_id: String, args: LogPredictionArgs, date: DateTime<Utc>) -> Self {
        let mut output = args.output;
        output.clear_feature_contributions();
        Event::Prediction(PredictionEvent {
            date,
            identifier: args.identifier,
            input: args.input,
            model_id,
            options: args.options,
            output,
        })
    }

    pub fn true_value(model_id: String, args: LogTrueValueArgs, date: DateTime<Utc>) -> Self {
        Event::TrueValue(TrueValueEvent {
            date,
            identifier: args.identifier,
            model_id,
            true_value: args.true_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict_input;
    use crate::predictor::{
        FeatureContributionEntry, FeatureContributions, RegressionPredictOutput,
    };
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_prediction_event_strips_contributions() {
        let output = PredictOutput::Regression(RegressionPredictOutput {
            value: 242_000.0,
            feature_contributions: Some(FeatureContributions {
                baseline_value: 180_000.0,
                output_value: 242_000.0,
                entries: vec![FeatureContributionEntry::Identity {
                    column_name: "square_feet".to_string(),
                    feature_value: 2_100.0,
                    feature_contribution_value: 62_000.0,
                }],
            }),
        });
        let event = Event::prediction(
            "abc".to_string(),
            LogPredictionArgs {
                identifier: Some("house-1".into()),
                input: predict_input! { "square_feet": 2100 },
                options: None,
                output,
            },
            date(),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "prediction");
        assert_eq!(json["modelId"], "abc");
        assert_eq!(json["identifier"], "house-1");
        assert_eq!(json["date"], "2022-03-01T12:30:00Z");
        assert_eq!(json["output"]["type"], "regression");
        assert!(json["output"]["featureContributions"].is_null());
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_true_value_event_shape() {
        let event = Event::true_value(
            "abc".to_string(),
            LogTrueValueArgs {
                identifier: 71.into(),
                true_value: "Positive".into(),
            },
            date(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "true_value");
        assert_eq!(json["identifier"], 71.0);
        assert_eq!(json["trueValue"], "Positive");

        let parsed: Event = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
        assert!(!parsed.is_prediction());
    }
}
