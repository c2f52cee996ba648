//! Raw records exchanged with the evaluator
//!
//! These mirror the evaluator's accessor surface: every variant is identified by a
//! numeric discriminant and fields that do not apply to a variant are left empty.
//! The decoders in [`super::features`] and [`super::output`] turn them into the
//! typed schema, and the `From` impls here encode the schema back.

use super::features::{FeatureContributionEntry, FeatureContributions, NGram};
use super::output::PredictOutput;
use serde::{Deserialize, Serialize};

/// Feature contribution entry discriminants
pub const ENTRY_IDENTITY: u32 = 0;
pub const ENTRY_NORMALIZED: u32 = 1;
pub const ENTRY_ONE_HOT_ENCODED: u32 = 2;
pub const ENTRY_BAG_OF_WORDS: u32 = 3;
pub const ENTRY_BAG_OF_WORDS_COSINE_SIMILARITY: u32 = 4;
pub const ENTRY_WORD_EMBEDDING: u32 = 5;

/// NGram discriminants
pub const NGRAM_UNIGRAM: u32 = 0;
pub const NGRAM_BIGRAM: u32 = 1;

/// One per-example result as returned by the evaluator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPredictOutput {
    /// Task discriminant, see [`crate::models::TASK_REGRESSION`] and friends
    pub task: u32,
    /// Regression only
    pub value: Option<f32>,
    /// Classification only
    pub class_name: Option<String>,
    /// Classification only
    pub probability: Option<f32>,
    /// Multiclass only, in the evaluator's iteration order
    pub probabilities: Option<Vec<(String, f32)>>,
    /// Regression and binary classification
    pub feature_contributions: Option<RawFeatureContributions>,
    /// Multiclass only, one entry per class
    pub class_feature_contributions: Option<Vec<(String, RawFeatureContributions)>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeatureContributions {
    pub baseline_value: f32,
    pub output_value: f32,
    pub entries: Vec<RawFeatureContributionEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeatureContributionEntry {
    /// Entry discriminant, see [`ENTRY_IDENTITY`] and friends
    pub kind: u32,
    pub column_name: Option<String>,
    pub column_name_a: Option<String>,
    pub column_name_b: Option<String>,
    pub variant: Option<String>,
    pub ngram: Option<RawNGram>,
    pub feature_value: Option<f32>,
    pub value_index: Option<u64>,
    pub feature_contribution_value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawNGram {
    pub kind: u32,
    pub tokens: Vec<String>,
}

impl From<&NGram> for RawNGram {
    fn from(ngram: &NGram) -> Self {
        match ngram {
            NGram::Unigram { token } => RawNGram {
                kind: NGRAM_UNIGRAM,
                tokens: vec![token.clone()],
            },
            NGram::Bigram { token_a, token_b } => RawNGram {
                kind: NGRAM_BIGRAM,
                tokens: vec![token_a.clone(), token_b.clone()],
            },
        }
    }
}

impl From<&FeatureContributionEntry> for RawFeatureContributionEntry {
    fn from(entry: &FeatureContributionEntry) -> Self {
        match entry {
            FeatureContributionEntry::Identity {
                column_name,
                feature_value,
                feature_contribution_value,
            } => RawFeatureContributionEntry {
                kind: ENTRY_IDENTITY,
                column_name: Some(column_name.clone()),
                feature_value: Some(*feature_value),
                feature_contribution_value: *feature_contribution_value,
                ..Default::default()
            },
            FeatureContributionEntry::Normalized {
                column_name,
                feature_value,
                feature_contribution_value,
            } => RawFeatureContributionEntry {
                kind: ENTRY_NORMALIZED,
                column_name: Some(column_name.clone()),
                feature_value: Some(*feature_value),
                feature_contribution_value: *feature_contribution_value,
                ..Default::default()
            },
            FeatureContributionEntry::OneHotEncoded {
                column_name,
                variant,
                feature_value,
                feature_contribution_value,
            } => RawFeatureContributionEntry {
                kind: ENTRY_ONE_HOT_ENCODED,
                column_name: Some(column_name.clone()),
                variant: variant.clone(),
                feature_value: Some(if *feature_value { 1.0 } else { 0.0 }),
                feature_contribution_value: *feature_contribution_value,
                ..Default::default()
            },
            FeatureContributionEntry::BagOfWords {
                column_name,
                ngram,
                feature_value,
                feature_contribution_value,
            } => RawFeatureContributionEntry {
                kind: ENTRY_BAG_OF_WORDS,
                column_name: Some(column_name.clone()),
                ngram: Some(ngram.into()),
                feature_value: Some(*feature_value),
                feature_contribution_value: *feature_contribution_value,
                ..Default::default()
            },
            FeatureContributionEntry::BagOfWordsCosineSimilarity {
                column_name_a,
                column_name_b,
                feature_value,
                feature_contribution_value,
            } => RawFeatureContributionEntry {
                kind: ENTRY_BAG_OF_WORDS_COSINE_SIMILARITY,
                column_name_a: Some(column_name_a.clone()),
                column_name_b: Some(column_name_b.clone()),
                feature_value: Some(*feature_value),
                feature_contribution_value: *feature_contribution_value,
                ..Default::default()
            },
            FeatureContributionEntry::WordEmbedding {
                column_name,
                value_index,
                feature_contribution_value,
            } => RawFeatureContributionEntry {
                kind: ENTRY_WORD_EMBEDDING,
                column_name: Some(column_name.clone()),
                value_index: Some(*value_index as u64),
                feature_contribution_value: *feature_contribution_value,
                ..Default::default()
            },
        }
    }
}

impl From<&FeatureContributions> for RawFeatureContributions {
    fn from(contributions: &FeatureContributions) -> Self {
        RawFeatureContributions {
            baseline_value: contributions.baseline_value,
            output_value: contributions.output_value,
            entries: contributions.entries.iter().map(Into::into).collect(),
        }
    }
}

impl From<&PredictOutput> for RawPredictOutput {
    fn from(output: &PredictOutput) -> Self {
        match output {
            PredictOutput::Regression(output) => RawPredictOutput {
                task: crate::models::TASK_REGRESSION,
                value: Some(output.value),
                feature_contributions: output.feature_contributions.as_ref().map(Into::into),
                ..Default::default()
            },
            PredictOutput::BinaryClassification(output) => RawPredictOutput {
                task: crate::models::TASK_BINARY_CLASSIFICATION,
                class_name: Some(output.class_name.clone()),
                probability: Some(output.probability),
                feature_contributions: output.feature_contributions.as_ref().map(Into::into),
                ..Default::default()
            },
            PredictOutput::MulticlassClassification(output) => RawPredictOutput {
                task: crate::models::TASK_MULTICLASS_CLASSIFICATION,
                class_name: Some(output.class_name.clone()),
                probability: Some(output.probability),
                probabilities: Some(
                    output
                        .probabilities
                        .iter()
                        .map(|(class, probability)| (class.clone(), *probability))
                        .collect(),
                ),
                class_feature_contributions: output.feature_contributions.as_ref().map(
                    |contributions| {
                        contributions
                            .iter()
                            .map(|(class, contributions)| (class.clone(), contributions.into()))
                            .collect()
                    },
                ),
                ..Default::default()
            },
        }
    }
}
