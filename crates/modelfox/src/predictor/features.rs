//! Feature contribution schema and decoder
//!
//! A [`FeatureContributions`] value explains one model output as a baseline plus
//! one signed contribution per feature. Features come from feature groups applied
//! to the input columns, so there are usually more entries than columns.

use super::raw::{
    RawFeatureContributionEntry, RawFeatureContributions, RawNGram, ENTRY_BAG_OF_WORDS,
    ENTRY_BAG_OF_WORDS_COSINE_SIMILARITY, ENTRY_IDENTITY, ENTRY_NORMALIZED,
    ENTRY_ONE_HOT_ENCODED, ENTRY_WORD_EMBEDDING, NGRAM_BIGRAM, NGRAM_UNIGRAM,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tolerance used when checking the linear decomposition of float32 outputs
pub const DECOMPOSITION_EPSILON: f32 = 1e-3;

/// Explanation of one output (or one class of a multiclass output)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureContributions {
    /// Output of the model if every feature took its baseline value
    pub baseline_value: f32,
    /// Output of the model for this input
    pub output_value: f32,
    /// One entry per feature, in feature index order
    pub entries: Vec<FeatureContributionEntry>,
}

impl FeatureContributions {
    /// Sum of all entry contributions
    pub fn total_contribution(&self) -> f32 {
        self.entries
            .iter()
            .map(FeatureContributionEntry::feature_contribution_value)
            .sum()
    }

    /// Difference between the output value and baseline plus contributions
    pub fn residual(&self) -> f32 {
        self.output_value - (self.baseline_value + self.total_contribution())
    }

    /// Whether output equals baseline plus contributions up to `epsilon`
    pub fn is_decomposed(&self, epsilon: f32) -> bool {
        self.residual().abs() < epsilon
    }
}

/// Contribution of a single feature, tagged by the feature group that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureContributionEntry {
    #[serde(rename_all = "camelCase")]
    Identity {
        column_name: String,
        feature_value: f32,
        feature_contribution_value: f32,
    },
    #[serde(rename_all = "camelCase")]
    Normalized {
        column_name: String,
        feature_value: f32,
        feature_contribution_value: f32,
    },
    /// `variant` is `None` for the feature that detects an unknown or absent value
    #[serde(rename_all = "camelCase")]
    OneHotEncoded {
        column_name: String,
        variant: Option<String>,
        feature_value: bool,
        feature_contribution_value: f32,
    },
    #[serde(rename_all = "camelCase")]
    BagOfWords {
        column_name: String,
        #[serde(rename = "nGram")]
        ngram: NGram,
        feature_value: f32,
        feature_contribution_value: f32,
    },
    #[serde(rename_all = "camelCase")]
    BagOfWordsCosineSimilarity {
        column_name_a: String,
        column_name_b: String,
        feature_value: f32,
        feature_contribution_value: f32,
    },
    #[serde(rename_all = "camelCase")]
    WordEmbedding {
        column_name: String,
        value_index: usize,
        feature_contribution_value: f32,
    },
}

impl FeatureContributionEntry {
    pub fn feature_contribution_value(&self) -> f32 {
        match self {
            FeatureContributionEntry::Identity {
                feature_contribution_value,
                ..
            }
            | FeatureContributionEntry::Normalized {
                feature_contribution_value,
                ..
            }
            | FeatureContributionEntry::OneHotEncoded {
                feature_contribution_value,
                ..
            }
            | FeatureContributionEntry::BagOfWords {
                feature_contribution_value,
                ..
            }
            | FeatureContributionEntry::BagOfWordsCosineSimilarity {
                feature_contribution_value,
                ..
            }
            | FeatureContributionEntry::WordEmbedding {
                feature_contribution_value,
                ..
            } => *feature_contribution_value,
        }
    }

    /// Human readable feature name, e.g. `chest_pain = 'asymptomatic'`
    pub fn feature_name(&self) -> String {
        match self {
            FeatureContributionEntry::Identity { column_name, .. } => column_name.clone(),
            FeatureContributionEntry::Normalized { column_name, .. } => column_name.clone(),
            FeatureContributionEntry::OneHotEncoded {
                column_name,
                variant: Some(variant),
                ..
            } => format!("{} = '{}'", column_name, variant),
            FeatureContributionEntry::OneHotEncoded {
                column_name,
                variant: None,
                ..
            } => format!("{} is unknown", column_name),
            FeatureContributionEntry::BagOfWords {
                column_name, ngram, ..
            } => format!("{} contains '{}'", column_name, ngram),
            FeatureContributionEntry::BagOfWordsCosineSimilarity {
                column_name_a,
                column_name_b,
                ..
            } => format!("similarity of {} and {}", column_name_a, column_name_b),
            FeatureContributionEntry::WordEmbedding {
                column_name,
                value_index,
                ..
            } => format!("{} embedding[{}]", column_name, value_index),
        }
    }
}

/// A sequence of one or two tokens used as a bag of words feature key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NGram {
    Unigram {
        token: String,
    },
    #[serde(rename_all = "camelCase")]
    Bigram {
        token_a: String,
        token_b: String,
    },
}

impl std::fmt::Display for NGram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NGram::Unigram { token } => f.write_str(token),
            NGram::Bigram { token_a, token_b } => write!(f, "{} {}", token_a, token_b),
        }
    }
}

/// Decode the evaluator's feature contributions, preserving entry order
pub fn decode_feature_contributions(raw: &RawFeatureContributions) -> Result<FeatureContributions> {
    let entries = raw
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            decode_entry(entry).map_err(|e| match e {
                Error::SchemaViolation(message) => Error::SchemaViolation(format!(
                    "feature contribution entry {}: {}",
                    index, message
                )),
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FeatureContributions {
        baseline_value: raw.baseline_value,
        output_value: raw.output_value,
        entries,
    })
}

/// Decode a single entry by dispatching on its discriminant
pub fn decode_entry(raw: &RawFeatureContributionEntry) -> Result<FeatureContributionEntry> {
    let feature_contribution_value = raw.feature_contribution_value;
    let entry = match raw.kind {
        ENTRY_IDENTITY => FeatureContributionEntry::Identity {
            column_name: required(&raw.column_name, "column_name")?,
            feature_value: required_value(raw.feature_value, "feature_value")?,
            feature_contribution_value,
        },
        ENTRY_NORMALIZED => FeatureContributionEntry::Normalized {
            column_name: required(&raw.column_name, "column_name")?,
            feature_value: required_value(raw.feature_value, "feature_value")?,
            feature_contribution_value,
        },
        ENTRY_ONE_HOT_ENCODED => FeatureContributionEntry::OneHotEncoded {
            column_name: required(&raw.column_name, "column_name")?,
            variant: raw.variant.clone(),
            feature_value: required_value(raw.feature_value, "feature_value")? != 0.0,
            feature_contribution_value,
        },
        ENTRY_BAG_OF_WORDS => FeatureContributionEntry::BagOfWords {
            column_name: required(&raw.column_name, "column_name")?,
            ngram: decode_ngram(
                raw.ngram
                    .as_ref()
                    .ok_or_else(|| Error::schema("missing field ngram"))?,
            )?,
            feature_value: required_value(raw.feature_value, "feature_value")?,
            feature_contribution_value,
        },
        ENTRY_BAG_OF_WORDS_COSINE_SIMILARITY => {
            FeatureContributionEntry::BagOfWordsCosineSimilarity {
                column_name_a: required(&raw.column_name_a, "column_name_a")?,
                column_name_b: required(&raw.column_name_b, "column_name_b")?,
                feature_value: required_value(raw.feature_value, "feature_value")?,
                feature_contribution_value,
            }
        }
        ENTRY_WORD_EMBEDDING => FeatureContributionEntry::WordEmbedding {
            column_name: required(&raw.column_name, "column_name")?,
            value_index: usize::try_from(required_value(raw.value_index, "value_index")?)
                .map_err(|_| Error::schema("value_index does not fit in usize"))?,
            feature_contribution_value,
        },
        other => {
            return Err(Error::schema(format!(
                "unknown feature contribution type {}",
                other
            )))
        }
    };
    Ok(entry)
}

/// Decode an ngram, checking the token count against its arity
pub fn decode_ngram(raw: &RawNGram) -> Result<NGram> {
    match (raw.kind, raw.tokens.as_slice()) {
        (NGRAM_UNIGRAM, [token]) => Ok(NGram::Unigram {
            token: token.clone(),
        }),
        (NGRAM_BIGRAM, [token_a, token_b]) => Ok(NGram::Bigram {
            token_a: token_a.clone(),
            token_b: token_b.clone(),
        }),
        (NGRAM_UNIGRAM, tokens) | (NGRAM_BIGRAM, tokens) => Err(Error::schema(format!(
            "ngram type {} has {} tokens",
            raw.kind,
            tokens.len()
        ))),
        (other, _) => Err(Error::schema(format!("unknown ngram type {}", other))),
    }
}

fn required(field: &Option<String>, name: &str) -> Result<String> {
    field
        .clone()
        .ok_or_else(|| Error::schema(format!("missing field {}", name)))
}

fn required_value<T: Copy>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| Error::schema(format!("missing field {}", name)))
}
