//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use modelfox::predictor::{FeatureContributionEntry, FeatureContributions};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse the `default_format` value from the config file
    pub fn from_config(value: Option<&str>) -> Option<Self> {
        value.and_then(|value| OutputFormat::from_str(value, true).ok())
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a table from a list of rows
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a probability as percentage
pub fn format_probability(probability: f32) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Color probability based on value
pub fn color_probability(probability: f32) -> String {
    let formatted = format_probability(probability);
    if probability >= 0.8 {
        formatted.green().to_string()
    } else if probability >= 0.6 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color a contribution by the direction it pushes the output
pub fn color_contribution(value: f32) -> String {
    let formatted = format!("{:+.4}", value);
    if value > 0.0 {
        formatted.green().to_string()
    } else if value < 0.0 {
        formatted.red().to_string()
    } else {
        formatted
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" | "not ready" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(timestamp: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Row for feature contribution tables
#[derive(Tabled)]
pub struct ContributionRow {
    #[tabled(rename = "Feature")]
    pub feature: String,
    #[tabled(rename = "Contribution")]
    pub contribution: String,
}

/// Entries ordered by absolute contribution, largest first
pub fn sorted_entries(contributions: &FeatureContributions) -> Vec<&FeatureContributionEntry> {
    let mut entries: Vec<&FeatureContributionEntry> = contributions.entries.iter().collect();
    entries.sort_by(|a, b| {
        b.feature_contribution_value()
            .abs()
            .total_cmp(&a.feature_contribution_value().abs())
    });
    entries
}

pub fn contribution_rows(
    contributions: &FeatureContributions,
    limit: usize,
) -> Vec<ContributionRow> {
    sorted_entries(contributions)
        .into_iter()
        .take(limit)
        .map(|entry| ContributionRow {
            feature: entry.feature_name(),
            contribution: color_contribution(entry.feature_contribution_value()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_entries_by_magnitude() {
        let contributions = FeatureContributions {
            baseline_value: 0.1,
            output_value: 0.6,
            entries: vec![
                FeatureContributionEntry::Identity {
                    column_name: "age".to_string(),
                    feature_value: 63.0,
                    feature_contribution_value: 0.1,
                },
                FeatureContributionEntry::Identity {
                    column_name: "cholesterol".to_string(),
                    feature_value: 233.0,
                    feature_contribution_value: -0.3,
                },
                FeatureContributionEntry::Identity {
                    column_name: "max_heart_rate".to_string(),
                    feature_value: 150.0,
                    feature_contribution_value: 0.7,
                },
            ],
        };

        let names: Vec<String> = sorted_entries(&contributions)
            .iter()
            .map(|entry| entry.feature_name())
            .collect();
        assert_eq!(names, vec!["max_heart_rate", "cholesterol", "age"]);
        assert_eq!(contribution_rows(&contributions, 2).len(), 2);
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_probability(0.871), "87.1%");
        assert_eq!(
            format_timestamp("2026-03-01T12:30:00Z"),
            "2026-03-01 12:30:00"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
        assert_eq!(
            OutputFormat::from_config(Some("JSON")),
            Some(OutputFormat::Json)
        );
        assert_eq!(OutputFormat::from_config(Some("yaml")), None);
    }
}
