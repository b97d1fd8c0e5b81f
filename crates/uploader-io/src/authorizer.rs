//! HTTP client for the resource authorizer.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use uploader_core::{ResourceAuthorizer, UploadError};

pub struct HttpAuthorizer {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthorizer {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpAuthorizer {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ResourceAuthorizer for HttpAuthorizer {
    async fn has_access(
        &self,
        token: &str,
        scope: &str,
        resource: &str,
    ) -> Result<bool, UploadError> {
        let url = format!("{}/{resource}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("scope", scope)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(UploadError::internal)?;

        // An undecodable answer is a denial, not an error.
        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "authorizer returned a non-JSON response");
                return Ok(false);
            }
        };
        Ok(data.get("access").and_then(Value::as_bool).unwrap_or(false))
    }
}
