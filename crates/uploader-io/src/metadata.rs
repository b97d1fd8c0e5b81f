//! HTTP client for the metadata service.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use uploader_core::{Config, Dataset, DistributionInput, EditionId, MetadataApi, UploadError};

const DISTRIBUTION_RETRIES: u32 = 3;

pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
    /// Service credential used when the caller has no token of its own (the
    /// asynchronous path).
    service_token: Option<String>,
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>, service_token: Option<String>) -> Self {
        MetadataClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            service_token,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        MetadataClient::new(&config.metadata_api_url, config.metadata_api_token.clone())
    }

    fn bearer<'a>(&'a self, token: Option<&'a str>) -> Option<&'a str> {
        token.or(self.service_token.as_deref())
    }

    /// GET a resource and check whether its `Id` matches exactly. The
    /// metadata service is the only authority on edition identity.
    async fn id_matches(&self, url: &str, expected: &str) -> Result<bool, UploadError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(UploadError::internal)?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(_) => return Ok(false),
        };
        Ok(data.get("Id").and_then(Value::as_str) == Some(expected))
    }
}

#[async_trait]
impl MetadataApi for MetadataClient {
    async fn dataset(&self, dataset_id: &str) -> Result<Dataset, UploadError> {
        let url = format!("{}/datasets/{dataset_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(UploadError::internal)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(UploadError::DatasetNotFound(dataset_id.to_string()));
        }
        let response = response.error_for_status().map_err(UploadError::internal)?;
        response.json().await.map_err(UploadError::internal)
    }

    async fn validate_edition(&self, edition: &EditionId) -> Result<bool, UploadError> {
        let url = format!(
            "{}/datasets/{}/versions/{}/editions/{}",
            self.base_url, edition.dataset_id, edition.version, edition.edition
        );
        let expected = edition.to_string();
        self.id_matches(&url, &expected).await
    }

    async fn validate_version(
        &self,
        dataset_id: &str,
        version: &str,
    ) -> Result<bool, UploadError> {
        let url = format!("{}/datasets/{dataset_id}/versions/{version}", self.base_url);
        let expected = format!("{dataset_id}/{version}");
        self.id_matches(&url, &expected).await
    }

    async fn create_edition(
        &self,
        token: Option<&str>,
        dataset_id: &str,
        version: &str,
    ) -> Result<String, UploadError> {
        let edition = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let body = serde_json::json!({
            "edition": edition,
            "description": format!("Data for {edition}"),
        });
        let url = format!("{}/{dataset_id}/versions/{version}/editions", self.base_url);
        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = self.bearer(token) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(UploadError::internal)?;
        if response.status() == StatusCode::CONFLICT {
            return Err(UploadError::DataExists(format!(
                "Edition: {edition} on datasetId {dataset_id} already exists"
            )));
        }
        let response = response.error_for_status().map_err(UploadError::internal)?;
        let text = response.text().await.map_err(UploadError::internal)?;
        Ok(text.trim().trim_matches('"').to_string())
    }

    async fn create_distribution(
        &self,
        token: Option<&str>,
        edition: &EditionId,
        distribution: &DistributionInput,
    ) -> Result<String, UploadError> {
        let url = format!(
            "{}/{}/versions/{}/editions/{}/distributions",
            self.base_url, edition.dataset_id, edition.version, edition.edition
        );
        let mut last_error = None;
        for attempt in 1..=DISTRIBUTION_RETRIES {
            let mut request = self.http.post(&url).json(distribution);
            if let Some(token) = self.bearer(token) {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let data: Value = response.json().await.map_err(UploadError::internal)?;
                    return Ok(data
                        .get("Id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string());
                }
                Ok(response) if response.status().is_server_error() => {
                    warn!(attempt, status = %response.status(), "distribution creation failed");
                    last_error = Some(anyhow!("status {}", response.status()));
                }
                Ok(response) => {
                    return Err(UploadError::internal(anyhow!(
                        "distribution creation failed with status {}",
                        response.status()
                    )));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "distribution creation failed");
                    last_error = Some(e.into());
                }
            }
        }
        Err(UploadError::internal(last_error.unwrap_or_else(|| {
            anyhow!("distribution creation failed after {DISTRIBUTION_RETRIES} attempts")
        })))
    }
}
