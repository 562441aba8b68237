use super::error::{EmptyBodySnafu, StatusSnafu, TransportError};
use super::logging::emit_debug_payload;
use crate::config::{Config, SamplingConfig};
use crate::util::is_local_endpoint_url;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Body of the single POST issued per prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl AskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: None,
            top_p: None,
        }
    }

    /// Fill unset sampling parameters from configured defaults.
    pub fn with_defaults(mut self, sampling: &SamplingConfig) -> Self {
        self.temperature.get_or_insert(sampling.temperature);
        self.top_p.get_or_insert(sampling.top_p);
        self
    }
}

/// Anything that can turn a prompt request into a response byte stream.
pub trait StreamSource: Send + Sync {
    fn open<'a>(&'a self, request: &'a AskRequest)
        -> BoxFuture<'a, Result<ByteStream, TransportError>>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    sampling: SamplingConfig,
    debug_payload: bool,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            sampling: config.sampling,
            debug_payload: config.debug_payload,
        }
    }

    pub async fn create_stream(&self, request: &AskRequest) -> Result<ByteStream, TransportError> {
        let request = request.clone().with_defaults(&self.sampling);
        let request_url = self.api_url.clone();

        if self.debug_payload {
            if let Ok(payload) = serde_json::to_value(&request) {
                emit_debug_payload(&request_url, &payload);
            }
        }

        let response = self
            .http
            .post(&request_url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|error| map_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            return StatusSnafu {
                url: request_url,
                status: status.as_u16(),
            }
            .fail();
        }
        if response.content_length() == Some(0) {
            return EmptyBodySnafu { url: request_url }.fail();
        }

        tracing::debug!(url = %request_url, status = status.as_u16(), "response stream opened");
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| TransportError::Interrupted {
                url: request_url.clone(),
                details: error.to_string(),
            })
        });
        Ok(Box::pin(stream))
    }
}

impl StreamSource for ApiClient {
    fn open<'a>(
        &'a self,
        request: &'a AskRequest,
    ) -> BoxFuture<'a, Result<ByteStream, TransportError>> {
        Box::pin(self.create_stream(request))
    }
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> TransportError {
    let url = request_url.to_string();
    if error.is_timeout() {
        return TransportError::Timeout { url, source: error };
    }
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return TransportError::LocalUnreachable { url, source: error };
    }
    TransportError::Connect { url, source: error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_omits_unset_sampling() {
        let body = serde_json::to_value(AskRequest::new("hi")).unwrap();
        assert_eq!(body, json!({"prompt": "hi"}));
    }

    #[test]
    fn test_with_defaults_keeps_explicit_values() {
        let request = AskRequest {
            prompt: "hi".to_string(),
            temperature: Some(0.1),
            top_p: None,
        }
        .with_defaults(&SamplingConfig::default());
        assert_eq!(request.temperature, Some(0.1));
        assert_eq!(request.top_p, Some(1.0));
    }

    #[tokio::test]
    async fn test_unreachable_local_endpoint_is_a_transport_error() {
        let config = Config {
            api_url: "http://127.0.0.1:9/api/ask".to_string(),
            sampling: SamplingConfig::default(),
            frame_interval: std::time::Duration::from_millis(16),
            store_path: std::path::PathBuf::from("/tmp/chatblocks-test.json"),
            debug_payload: false,
        };
        let client = ApiClient::new(&config);
        let error = match client.create_stream(&AskRequest::new("hi")).await {
            Ok(_) => panic!("port 9 should refuse connections"),
            Err(error) => error,
        };
        assert!(error.is_before_body());
        assert!(matches!(error, TransportError::LocalUnreachable { .. }));
    }
}
