//! Prediction commands

use anyhow::{Context, Result};
use colored::Colorize;
use modelfox::predictor::FeatureContributions;
use modelfox::{PredictInput, PredictInputValue, PredictInputs, PredictOptions, PredictOutput};
use std::path::Path;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_probability, contribution_rows, print_json, print_table, print_warning, OutputFormat,
};

/// Number of contributions shown per output in table mode
const TOP_CONTRIBUTIONS: usize = 10;

/// Row for prediction summary tables
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Task")]
    task: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
    #[tabled(rename = "Probability")]
    probability: String,
}

/// Parse a `column=value` argument; values that parse as numbers become numbers
pub fn parse_input_pair(pair: &str) -> Result<(String, PredictInputValue)> {
    let (column, value) = pair
        .split_once('=')
        .with_context(|| format!("Expected column=value, got '{}'", pair))?;
    let column = column.trim();
    if column.is_empty() {
        anyhow::bail!("Empty column name in '{}'", pair);
    }
    let value = match value.parse::<f64>() {
        Ok(number) if number.is_finite() => PredictInputValue::Number(number),
        _ => PredictInputValue::String(value.to_string()),
    };
    Ok((column.to_string(), value))
}

/// Build inputs from a JSON file and/or `column=value` pairs.
///
/// Pairs are applied on top of every input read from the file.
pub fn read_inputs(file: Option<&Path>, pairs: &[String]) -> Result<PredictInputs> {
    let mut inputs = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse inputs in {}", path.display()))?
        }
        None => PredictInputs::One(PredictInput::new()),
    };

    for pair in pairs {
        let (column, value) = parse_input_pair(pair)?;
        match &mut inputs {
            PredictInputs::One(input) => input.insert(column, value),
            PredictInputs::Many(batch) => {
                for input in batch.iter_mut() {
                    input.insert(column.clone(), value.clone());
                }
            }
        }
    }

    Ok(inputs)
}

pub fn build_options(threshold: Option<f32>, contributions: bool) -> Option<PredictOptions> {
    if threshold.is_none() && !contributions {
        return None;
    }
    let mut options = PredictOptions::default();
    if let Some(threshold) = threshold {
        options.threshold = threshold;
    }
    options.compute_feature_contributions = contributions;
    Some(options)
}

/// Run a prediction and print the outputs
pub async fn predict(
    client: &ApiClient,
    inputs: PredictInputs,
    options: Option<PredictOptions>,
    format: OutputFormat,
) -> Result<()> {
    let outputs = client.predict(inputs, options).await?;

    match format {
        OutputFormat::Json => print_json(&outputs)?,
        OutputFormat::Table => print_outputs(&outputs.into_vec()),
    }

    Ok(())
}

pub fn print_outputs(outputs: &[PredictOutput]) {
    let rows: Vec<PredictionRow> = outputs
        .iter()
        .enumerate()
        .map(|(index, output)| PredictionRow {
            index,
            task: output.task().to_string(),
            prediction: prediction_label(output),
            probability: match output {
                PredictOutput::Regression(_) => "-".to_string(),
                PredictOutput::BinaryClassification(output) => {
                    color_probability(output.probability)
                }
                PredictOutput::MulticlassClassification(output) => {
                    color_probability(output.probability)
                }
            },
        })
        .collect();
    print_table(rows);

    for (index, output) in outputs.iter().enumerate() {
        match output {
            PredictOutput::Regression(output) => {
                if let Some(contributions) = &output.feature_contributions {
                    print_contributions(index, None, contributions);
                }
            }
            PredictOutput::BinaryClassification(output) => {
                if let Some(contributions) = &output.feature_contributions {
                    print_contributions(index, None, contributions);
                }
            }
            PredictOutput::MulticlassClassification(output) => {
                if let Some(by_class) = &output.feature_contributions {
                    for (class_name, contributions) in by_class {
                        print_contributions(index, Some(class_name.as_str()), contributions);
                    }
                }
            }
        }
    }
}

fn prediction_label(output: &PredictOutput) -> String {
    match output {
        PredictOutput::Regression(output) => format!("{:.4}", output.value),
        PredictOutput::BinaryClassification(output) => output.class_name.clone(),
        PredictOutput::MulticlassClassification(output) => output.class_name.clone(),
    }
}

fn print_contributions(
    index: usize,
    class_name: Option<&str>,
    contributions: &FeatureContributions,
) {
    println!();
    let title = match class_name {
        Some(class_name) => format!("Feature contributions for #{} ({})", index, class_name),
        None => format!("Feature contributions for #{}", index),
    };
    println!("{}", title.bold());
    println!(
        "Baseline: {:.4}  Output: {:.4}",
        contributions.baseline_value, contributions.output_value
    );
    if contributions.entries.is_empty() {
        print_warning("No feature contributions");
        return;
    }
    print_table(contribution_rows(contributions, TOP_CONTRIBUTIONS));
    if contributions.entries.len() > TOP_CONTRIBUTIONS {
        println!(
            "{} more not shown",
            contributions.entries.len() - TOP_CONTRIBUTIONS
        );
    }
}
