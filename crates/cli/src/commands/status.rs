//! Sidecar status command

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, format_timestamp, print_json, print_table, OutputFormat};
use modelfox::sync::QueueStats;

/// Row for component health tables
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

#[derive(Serialize)]
struct StatusReport {
    model_id: String,
    readiness: ReadinessResponse,
    health: HealthResponse,
    queue: QueueStats,
}

/// Show the loaded model, probe results and the event queue
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report = StatusReport {
        model_id: client.model_id().await?,
        readiness: client.readiness().await?,
        health: client.health().await?,
        queue: client.queue_stats().await?,
    };

    if format == OutputFormat::Json {
        return print_json(&report);
    }

    println!("{}", "Sidecar Status".bold());
    println!("{}", "=".repeat(60));
    println!("Model:     {}", report.model_id.cyan());
    let ready = if report.readiness.ready {
        "ready"
    } else {
        "not ready"
    };
    match &report.readiness.reason {
        Some(reason) => println!("Readiness: {} ({})", color_status(ready), reason),
        None => println!("Readiness: {}", color_status(ready)),
    }
    println!("Health:    {}", color_status(&report.health.status));
    println!();

    let rows: Vec<ComponentRow> = report
        .health
        .components
        .iter()
        .map(|(name, component)| ComponentRow {
            name: name.clone(),
            status: color_status(&component.status),
            message: component.message.clone().unwrap_or_else(|| "-".to_string()),
            last_check: chrono::DateTime::from_timestamp(component.last_check_timestamp, 0)
                .map(|dt| format_timestamp(&dt.to_rfc3339()))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    print_table(rows);

    println!();
    println!("{}", "Event Queue".bold());
    println!(
        "Queued: {} ({} predictions, {} true values)",
        report.queue.queued, report.queue.predictions, report.queue.true_values
    );
    if let (Some(oldest), Some(newest)) = (report.queue.oldest, report.queue.newest) {
        println!(
            "Dates:  {} .. {}",
            format_timestamp(&oldest.to_rfc3339()),
            format_timestamp(&newest.to_rfc3339())
        );
    }

    Ok(())
}
