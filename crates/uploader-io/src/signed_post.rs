//! Time-limited signed POST credentials for direct-to-bucket uploads.
//!
//! Builds an S3 POST policy (sigv4): the policy document pins the bucket,
//! the exact key, a private ACL, and a 300-second expiry; the signature is
//! the standard AWS4 HMAC chain over the base64 policy.

use std::collections::BTreeMap;
use std::env;

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use uploader_core::{Config, UploadError};

type HmacSha256 = Hmac<Sha256>;

/// Validity window of a signed POST.
pub const POST_EXPIRY_SECONDS: i64 = 300;

#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self, UploadError> {
        let access_key_id = env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| UploadError::internal(anyhow!("AWS_ACCESS_KEY_ID is not set")))?;
        let secret_access_key = env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| UploadError::internal(anyhow!("AWS_SECRET_ACCESS_KEY is not set")))?;
        Ok(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

/// The URL and form fields a client needs to POST a file.
#[derive(Debug, Clone, Serialize)]
pub struct SignedPost {
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

pub struct SignedPostGenerator {
    credentials: AwsCredentials,
    region: String,
    bucket: String,
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, UploadError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(UploadError::internal)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl SignedPostGenerator {
    pub fn new(
        credentials: AwsCredentials,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        SignedPostGenerator {
            credentials,
            region: region.into(),
            bucket: bucket.into(),
        }
    }

    pub fn from_env(config: &Config) -> Result<Self, UploadError> {
        Ok(SignedPostGenerator::new(
            AwsCredentials::from_env()?,
            &config.region,
            &config.bucket,
        ))
    }

    pub fn generate(&self, key: &str) -> Result<SignedPost, UploadError> {
        self.generate_at(key, Utc::now())
    }

    fn signing_key(&self, date: &str) -> Result<Vec<u8>, UploadError> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let key = hmac(secret.as_bytes(), date.as_bytes())?;
        let key = hmac(&key, self.region.as_bytes())?;
        let key = hmac(&key, b"s3")?;
        hmac(&key, b"aws4_request")
    }

    pub(crate) fn generate_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedPost, UploadError> {
        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential = format!(
            "{}/{date}/{}/s3/aws4_request",
            self.credentials.access_key_id, self.region
        );
        let expiration = (now + Duration::seconds(POST_EXPIRY_SECONDS))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let mut conditions = vec![
            serde_json::json!({"acl": "private"}),
            serde_json::json!({"bucket": self.bucket}),
            serde_json::json!(["eq", "$key", key]),
            serde_json::json!({"x-amz-algorithm": "AWS4-HMAC-SHA256"}),
            serde_json::json!({"x-amz-credential": credential}),
            serde_json::json!({"x-amz-date": amz_date}),
        ];
        if let Some(token) = &self.credentials.session_token {
            conditions.push(serde_json::json!({"x-amz-security-token": token}));
        }
        let policy = serde_json::json!({
            "expiration": expiration,
            "conditions": conditions,
        });
        let policy_b64 = BASE64.encode(serde_json::to_vec(&policy).map_err(UploadError::internal)?);
        let signature = hex(&hmac(&self.signing_key(&date)?, policy_b64.as_bytes())?);

        let mut fields = BTreeMap::from([
            ("acl".to_string(), "private".to_string()),
            ("key".to_string(), key.to_string()),
            ("policy".to_string(), policy_b64),
            (
                "x-amz-algorithm".to_string(),
                "AWS4-HMAC-SHA256".to_string(),
            ),
            ("x-amz-credential".to_string(), credential),
            ("x-amz-date".to_string(), amz_date),
            ("x-amz-signature".to_string(), signature),
        ]);
        if let Some(token) = &self.credentials.session_token {
            fields.insert("x-amz-security-token".to_string(), token.clone());
        }

        Ok(SignedPost {
            // Path-style addressing: CORS configuration does not propagate
            // to the virtual-hosted URLs right away.
            url: format!("https://s3.{}.amazonaws.com/{}", self.region, self.bucket),
            fields,
        })
    }
}
