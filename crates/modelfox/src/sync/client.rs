//! HTTP transport for the tracking endpoint
//!
//! Events are POSTed as one JSON array to `{base_url}/track`. Any 2xx response
//! confirms the whole batch; anything else is reported with its status and body.

use super::event::Event;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Base URL of the hosted app
pub const DEFAULT_MODELFOX_URL: &str = "https://app.modelfox.dev";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers batches of events
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Send every event in one request; `Ok` means the whole batch was accepted
    async fn send(&self, events: &[Event]) -> Result<()>;
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MODELFOX_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Transport that POSTs JSON to the tracking endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    track_url: Url,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let track_url = track_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| transport_setup_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, track_url })
    }

    pub fn track_url(&self) -> &Url {
        &self.track_url
    }
}

/// `{base_url}/track`, keeping any path prefix of the base URL
fn track_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| transport_setup_error(format!("Invalid ModelFox URL {}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| transport_setup_error(format!("Invalid ModelFox URL {}", base_url)))?
        .pop_if_empty()
        .push("track");
    Ok(url)
}

/// Failures before any request is sent carry no status
fn transport_setup_error(body: String) -> Error {
    Error::LogTransportFailed { status: None, body }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn send(&self, events: &[Event]) -> Result<()> {
        debug!(url = %self.track_url, events = events.len(), "Sending events");

        let response = self
            .client
            .post(self.track_url.clone())
            .json(events)
            .send()
            .await
            .map_err(|e| Error::LogTransportFailed {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LogTransportFailed {
                status: Some(status.as_u16()),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::event::LogTrueValueArgs;
    use chrono::Utc;

    fn events() -> Vec<Event> {
        vec![Event::true_value(
            "model".to_string(),
            LogTrueValueArgs {
                identifier: "a".into(),
                true_value: 1.into(),
            },
            Utc::now(),
        )]
    }

    #[test]
    fn test_track_url() {
        assert_eq!(
            track_url("https://app.modelfox.dev").unwrap().as_str(),
            "https://app.modelfox.dev/track"
        );
        assert_eq!(
            track_url("http://localhost:8080/modelfox/").unwrap().as_str(),
            "http://localhost:8080/modelfox/track"
        );
        assert!(matches!(
            track_url("not a url"),
            Err(Error::LogTransportFailed { status: None, .. })
        ));
    }

    #[test]
    fn test_invalid_base_url_is_a_transport_error() {
        for base_url in ["not a url", "mailto:events@modelfox.dev"] {
            let result = HttpTransport::new(TransportConfig {
                base_url: base_url.to_string(),
                ..Default::default()
            });
            match result {
                Err(Error::LogTransportFailed { status, body }) => {
                    assert_eq!(status, None);
                    assert!(body.contains(base_url), "body should name the URL: {}", body);
                }
                Err(other) => panic!("expected transport failure, got {:?}", other),
                Ok(_) => panic!("expected {} to be rejected", base_url),
            }
        }
    }

    #[tokio::test]
    async fn test_send_posts_json_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/track")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Regex(r#"^\[\{"type":"true_value""#.to_string()))
            .with_status(202)
            .create_async()
            .await;

        let transport = HttpTransport::new(TransportConfig {
            base_url: server.url(),
            ..Default::default()
        })
        .unwrap();
        transport.send(&events()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/track")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let transport = HttpTransport::new(TransportConfig {
            base_url: server.url(),
            ..Default::default()
        })
        .unwrap();
        match transport.send(&events()).await {
            Err(Error::LogTransportFailed { status, body }) => {
                assert_eq!(status, Some(500));
                assert_eq!(body, "internal error");
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_has_no_status() {
        let transport = HttpTransport::new(TransportConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        match transport.send(&events()).await {
            Err(Error::LogTransportFailed { status, .. }) => assert_eq!(status, None),
            other => panic!("expected transport failure, got {:?}", other),
        }
    }
}
