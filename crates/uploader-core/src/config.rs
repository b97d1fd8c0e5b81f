//! Process configuration from the environment.

use std::env;
use std::time::Duration;

const DEFAULT_LOCK_RETRIES: u32 = 5;
const DEFAULT_LOCK_WAIT_SECONDS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for environment variable {0}: {1}")]
    InvalidVar(&'static str, String),
}

/// Everything the uploader needs from its environment, read once at startup
/// and passed explicitly to the handlers.
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub region: String,
    pub metadata_api_url: String,
    pub status_api_url: String,
    pub event_queue_name: String,
    pub email_api_url: String,
    /// Shared secret for the email gateway (`apikey` header).
    pub email_api_key: String,
    /// Service credential used against the metadata API when no caller token
    /// is available (the asynchronous path).
    pub metadata_api_token: Option<String>,
    /// Authorizer endpoint; required when `enable_auth` is set.
    pub authorizer_api: Option<String>,
    pub enable_auth: bool,
    pub lock_retries: u32,
    pub lock_wait: Duration,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let enable_auth = match env::var("ENABLE_AUTH").as_deref() {
            Ok("true") => true,
            Ok("false") | Err(_) => false,
            Ok(other) => {
                return Err(ConfigError::InvalidVar("ENABLE_AUTH", other.to_string()))
            }
        };
        let lock_retries = match env::var("LOCK_RETRIES") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidVar("LOCK_RETRIES", raw))?,
            Err(_) => DEFAULT_LOCK_RETRIES,
        };
        let lock_wait_seconds = match env::var("LOCK_WAIT_SECONDS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidVar("LOCK_WAIT_SECONDS", raw))?,
            Err(_) => DEFAULT_LOCK_WAIT_SECONDS,
        };
        let config = Config {
            bucket: required("BUCKET")?,
            region: required("AWS_REGION")?,
            metadata_api_url: required("METADATA_API_URL")?,
            status_api_url: required("STATUS_API_URL")?,
            event_queue_name: required("EVENT_QUEUE_NAME")?,
            email_api_url: required("EMAIL_API_URL")?,
            email_api_key: required("EMAIL_API_KEY")?,
            metadata_api_token: env::var("METADATA_API_TOKEN").ok(),
            authorizer_api: env::var("AUTHORIZER_API").ok(),
            enable_auth,
            lock_retries,
            lock_wait: Duration::from_secs(lock_wait_seconds),
        };
        if config.enable_auth && config.authorizer_api.is_none() {
            return Err(ConfigError::MissingVar("AUTHORIZER_API"));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        // Exercised without touching the process environment.
        let config = Config {
            bucket: "b".into(),
            region: "eu-west-1".into(),
            metadata_api_url: "http://metadata".into(),
            status_api_url: "http://status".into(),
            event_queue_name: "events.fifo".into(),
            email_api_url: "http://email".into(),
            email_api_key: "secret".into(),
            metadata_api_token: None,
            authorizer_api: None,
            enable_auth: false,
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_wait: Duration::from_secs(DEFAULT_LOCK_WAIT_SECONDS),
        };
        assert_eq!(config.lock_retries, 5);
        assert_eq!(config.lock_wait, Duration::from_secs(5));
    }
}
