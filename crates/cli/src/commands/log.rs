//! Event logging and flush commands

use anyhow::Result;
use modelfox::{LogPredictionArgs, LogTrueValueArgs, NumberOrString, PredictInput, PredictOptions};

use crate::client::ApiClient;
use crate::commands::predict::print_outputs;
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// Numbers stay numbers, anything else is sent as a string
pub fn parse_number_or_string(value: &str) -> NumberOrString {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => NumberOrString::Number(number),
        _ => NumberOrString::String(value.to_string()),
    }
}

/// Predict one input, then queue the prediction for logging
pub async fn log_prediction(
    client: &ApiClient,
    identifier: Option<String>,
    input: PredictInput,
    options: Option<PredictOptions>,
    format: OutputFormat,
) -> Result<()> {
    let output = client
        .predict(input.clone().into(), options.clone())
        .await?
        .into_vec()
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Sidecar returned no output"))?;

    let args = LogPredictionArgs {
        identifier: identifier.as_deref().map(parse_number_or_string),
        input,
        options,
        output: output.clone(),
    };
    let response = client.log_prediction(&args).await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "output": output,
            "queued": response.queued,
        }))?,
        OutputFormat::Table => {
            print_outputs(std::slice::from_ref(&output));
            print_success(&format!(
                "Prediction queued ({} events waiting)",
                response.queued
            ));
        }
    }

    Ok(())
}

/// Queue the true value for an earlier prediction
pub async fn log_true_value(
    client: &ApiClient,
    identifier: &str,
    true_value: &str,
    format: OutputFormat,
) -> Result<()> {
    let args = LogTrueValueArgs {
        identifier: parse_number_or_string(identifier),
        true_value: parse_number_or_string(true_value),
    };
    let response = client.log_true_value(&args).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_success(&format!(
            "True value for {} queued ({} events waiting)",
            args.identifier, response.queued
        )),
    }

    Ok(())
}

/// Ship every queued event to the app
pub async fn flush(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response = client.flush().await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            if response.sent == 0 {
                print_info("Nothing to flush");
            } else {
                print_success(&format!("Flushed {} events", response.sent));
            }
            if response.queued > 0 {
                print_warning(&format!(
                    "{} events were queued during the flush",
                    response.queued
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_or_string() {
        assert_eq!(parse_number_or_string("71"), NumberOrString::Number(71.0));
        assert_eq!(
            parse_number_or_string("patient-71"),
            NumberOrString::String("patient-71".to_string())
        );
        assert_eq!(
            parse_number_or_string("NaN"),
            NumberOrString::String("NaN".to_string())
        );
    }

    #[tokio::test]
    async fn test_log_true_value_posts_camel_case() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/log/true_value")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "identifier": "patient-71",
                "trueValue": "Negative"
            })))
            .with_status(202)
            .with_body(r#"{"queued": 1}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        log_true_value(&client, "patient-71", "Negative", OutputFormat::Json)
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
