//! ModelFox CLI
//!
//! A command-line tool for running predictions against a serving sidecar,
//! logging predictions and true values, and inspecting the event queue.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{log, predict, status};
use modelfox::PredictInputs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ModelFox CLI
#[derive(Parser)]
#[command(name = "modelfox")]
#[command(author, version, about = "CLI for the ModelFox serving sidecar", long_about = None)]
pub struct Cli {
    /// Sidecar URL (can also be set via MODELFOX_SERVER_URL or the config file)
    #[arg(long, env = "MODELFOX_SERVER_URL")]
    pub server_url: Option<String>,

    /// Output format (defaults to the config file, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the id of the loaded model
    Id,

    /// Run a prediction
    Predict {
        #[command(flatten)]
        input: InputArgs,

        /// Decision threshold for binary classifiers
        #[arg(long)]
        threshold: Option<f32>,

        /// Compute feature contributions
        #[arg(long)]
        contributions: bool,
    },

    /// Queue events for the app
    #[command(subcommand)]
    Log(LogCommands),

    /// Ship queued events to the app now
    Flush,

    /// Show model, health and queue status
    Status,
}

#[derive(Subcommand)]
pub enum LogCommands {
    /// Predict one input and queue the prediction
    Prediction {
        /// Identifier used to match a later true value
        #[arg(long)]
        identifier: Option<String>,

        #[command(flatten)]
        input: InputArgs,

        /// Decision threshold for binary classifiers
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Queue the true value for an earlier prediction
    TrueValue {
        /// Identifier the prediction was logged with
        identifier: String,

        /// Observed value
        true_value: String,
    },
}

#[derive(clap::Args)]
pub struct InputArgs {
    /// JSON file with one input object or an array of them
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Column value as column=value, may be repeated
    #[arg(long = "input", short = 'i')]
    pub pairs: Vec<String>,
}

impl InputArgs {
    fn read(&self) -> Result<PredictInputs> {
        predict::read_inputs(self.file.as_deref(), &self.pairs)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| output::OutputFormat::from_config(config.default_format.as_deref()))
        .unwrap_or_default();
    let server_url = config.server_url(cli.server_url.as_deref());
    tracing::debug!(server_url = %server_url, ?format, "Resolved CLI settings");

    // Initialize client
    let client = client::ApiClient::new(&server_url)?;

    // Execute command
    if let Err(e) = run(&client, cli.command, format).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(
    client: &client::ApiClient,
    command: Commands,
    format: output::OutputFormat,
) -> Result<()> {
    match command {
        Commands::Id => {
            let id = client.model_id().await?;
            match format {
                output::OutputFormat::Json => {
                    output::print_json(&serde_json::json!({ "model_id": id }))?
                }
                output::OutputFormat::Table => println!("{}", id),
            }
        }
        Commands::Predict {
            input,
            threshold,
            contributions,
        } => {
            let options = predict::build_options(threshold, contributions);
            predict::predict(client, input.read()?, options, format).await?;
        }
        Commands::Log(log_cmd) => match log_cmd {
            LogCommands::Prediction {
                identifier,
                input,
                threshold,
            } => {
                let input = match input.read()? {
                    PredictInputs::One(input) => input,
                    PredictInputs::Many(mut batch) if batch.len() == 1 => batch.remove(0),
                    PredictInputs::Many(batch) => {
                        anyhow::bail!("Expected a single input, got {}", batch.len())
                    }
                };
                let options = predict::build_options(threshold, false);
                log::log_prediction(client, identifier, input, options, format)
                    .await
                    .context("Failed to log prediction")?;
            }
            LogCommands::TrueValue {
                identifier,
                true_value,
            } => {
                log::log_true_value(client, &identifier, &true_value, format).await?;
            }
        },
        Commands::Flush => {
            log::flush(client, format).await?;
        }
        Commands::Status => {
            status::show_status(client, format).await?;
        }
    }

    Ok(())
}
