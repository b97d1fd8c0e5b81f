//! HTTP client for the status API.

use async_trait::async_trait;
use serde_json::Value;

use uploader_core::{Config, StatusApi, StatusTrace, UploadError};

pub struct StatusClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl StatusClient {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        StatusClient {
            http: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        StatusClient::new(&config.status_api_url, config.metadata_api_token.clone())
    }

    async fn post(&self, trace: &StatusTrace) -> Result<reqwest::Response, UploadError> {
        let mut request = self.http.post(&self.url).json(trace);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(UploadError::internal)?
            .error_for_status()
            .map_err(UploadError::internal)
    }
}

#[async_trait]
impl StatusApi for StatusClient {
    async fn create_trace(&self, trace: &StatusTrace) -> Result<String, UploadError> {
        let response = self.post(trace).await?;
        // The API echoes the trace id; fall back to ours if the body is not
        // what we expect.
        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(_) => Value::Null,
        };
        Ok(data
            .get("trace_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| trace.trace_id.clone()))
    }

    async fn update_trace(&self, trace: &StatusTrace) -> Result<(), UploadError> {
        self.post(trace).await?;
        Ok(())
    }
}
