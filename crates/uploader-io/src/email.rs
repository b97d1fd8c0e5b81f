//! HTTP client for the email gateway.

use async_trait::async_trait;

use uploader_core::{Config, EmailGateway, EmailMessage, UploadError};

pub struct EmailClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl EmailClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        EmailClient {
            http: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        EmailClient::new(&config.email_api_url, &config.email_api_key)
    }
}

#[async_trait]
impl EmailGateway for EmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<(), UploadError> {
        // The gateway renders HTML.
        let mut payload = message.clone();
        payload.body = payload.body.replace('\n', "<br />");

        self.http
            .post(&self.url)
            .header("apikey", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(UploadError::internal)?
            .error_for_status()
            .map_err(UploadError::internal)?;
        Ok(())
    }
}
