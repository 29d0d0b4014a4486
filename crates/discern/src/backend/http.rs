//! reqwest implementations of the analysis and cache boundaries.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use super::{AnalysisBackend, CacheRecord, ResultCache};
use crate::config::ApiConfig;
use crate::error::{AnalysisError, CacheError};
use crate::pipeline::PipelineKind;
use crate::sanitize::{redact_url, truncate_error_body};

/// Shared connection state for both HTTP clients.
#[derive(Clone, Debug)]
struct ServiceConnection {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl ServiceConnection {
    fn new(api: &ApiConfig, api_key: Option<SecretString>) -> Result<Self, String> {
        let base_url = Url::parse(api.base_url.trim_end_matches('/'))
            .map_err(|e| format!("Invalid service URL '{}': {}", redact_url(&api.base_url), e))?;
        if base_url.cannot_be_a_base() {
            return Err(format!(
                "Service URL '{}' cannot be used as a base URL",
                redact_url(&api.base_url)
            ));
        }

        let client = Client::builder()
            .connect_timeout(api.connect_timeout())
            .timeout(api.request_timeout())
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }
}

/// Pulls a human-readable message out of an error response body.
///
/// Accepts `{"error": "..."}`, `{"message": "..."}` and
/// `{"error": {"message": "..."}}`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = match value.get("error") {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(Value::Object(inner)) => inner.get("message").and_then(Value::as_str),
        _ => None,
    }
    .or_else(|| value.get("message").and_then(Value::as_str))?;

    let message = message.trim();
    (!message.is_empty()).then(|| truncate_error_body(message))
}

async fn failure_from_response(kind: PipelineKind, response: Response) -> AnalysisError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body).unwrap_or_else(|| {
        format!(
            "{} failed ({}). Please try again.",
            kind,
            status.canonical_reason().unwrap_or("request error")
        )
    });

    warn!(
        kind = %kind.as_str(),
        status = status.as_u16(),
        body = %truncate_error_body(&body),
        "Analysis request failed"
    );

    AnalysisError::Request {
        message,
        status: Some(status.as_u16()),
    }
}

/// Posts analysis requests to `{base_url}/api/analyze/{kind}`.
#[derive(Clone, Debug)]
pub struct HttpAnalysisClient {
    connection: ServiceConnection,
}

impl HttpAnalysisClient {
    pub fn new(api: &ApiConfig, api_key: Option<SecretString>) -> Result<Self, AnalysisError> {
        let connection = ServiceConnection::new(api, api_key).map_err(AnalysisError::request)?;
        Ok(Self { connection })
    }

    pub fn endpoint(&self, kind: PipelineKind) -> Url {
        self.connection.url(&kind.endpoint_path())
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisClient {
    async fn analyze(&self, kind: PipelineKind, body: Value) -> Result<Value, AnalysisError> {
        let url = self.endpoint(kind);
        debug!(kind = %kind.as_str(), url = %redact_url(url.as_str()), "Sending analysis request");

        let response = self
            .connection
            .authorize(self.connection.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let status = e.status().map(|s| s.as_u16());
                let message = if e.is_timeout() {
                    format!("{} timed out. Please try again.", kind)
                } else {
                    format!("Could not reach the analysis service: {}", e.without_url())
                };
                AnalysisError::Request { message, status }
            })?;

        if !response.status().is_success() {
            return Err(failure_from_response(kind, response).await);
        }

        response.json::<Value>().await.map_err(|e| {
            AnalysisError::request(format!("Failed to parse {} response: {}", kind, e))
        })
    }
}

/// Reads and writes cache records at `{base_url}/api/cache/{content_id}`.
#[derive(Clone, Debug)]
pub struct HttpResultCache {
    connection: ServiceConnection,
}

impl HttpResultCache {
    pub fn new(api: &ApiConfig, api_key: Option<SecretString>) -> Result<Self, CacheError> {
        let connection = ServiceConnection::new(api, api_key).map_err(CacheError::Request)?;
        Ok(Self { connection })
    }

    pub fn record_url(&self, content_id: &str) -> Url {
        self.connection.url(&["api", "cache", content_id])
    }

    pub fn slot_url(&self, content_id: &str, kind: PipelineKind) -> Url {
        self.connection
            .url(&["api", "cache", content_id, kind.cache_slot()])
    }
}

#[async_trait]
impl ResultCache for HttpResultCache {
    async fn read(&self, content_id: &str) -> Result<CacheRecord, CacheError> {
        let request = self.connection.client.get(self.record_url(content_id));
        let response = self
            .connection
            .authorize(request)
            .send()
            .await
            .map_err(|e| CacheError::Request(e.without_url().to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(content_id = %content_id, "No cache record");
            return Ok(CacheRecord::empty(content_id));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::Request(format!(
                "Cache read failed ({}): {}",
                status,
                truncate_error_body(&body)
            )));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| CacheError::Decode(e.to_string()))?;
        CacheRecord::from_wire(content_id, value)
    }

    async fn write(
        &self,
        content_id: &str,
        kind: PipelineKind,
        result: Value,
    ) -> Result<(), CacheError> {
        let request = self
            .connection
            .client
            .put(self.slot_url(content_id, kind))
            .json(&result);
        let response = self
            .connection
            .authorize(request)
            .send()
            .await
            .map_err(|e| CacheError::Request(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::Request(format!(
                "Cache write failed ({}): {}",
                status,
                truncate_error_body(&body)
            )));
        }
        Ok(())
    }
}
