//! Inbound request envelopes.
//!
//! The HTTP transport is out of scope; events arrive as already-parsed
//! request envelopes carrying the raw body, the authorization header, and
//! the gateway principal. Body parsing distinguishes malformed JSON from
//! schema violations because they surface differently to the caller.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::UploadError;

/// Maximum raw body size accepted on the asynchronous (v2) path. A body of
/// exactly this size is rejected.
pub const MAX_EVENT_BODY_BYTES: usize = 256 * 1024;

/// A request as handed over by the gateway.
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope {
    /// Raw request body, still unparsed.
    pub body: String,
    /// Verbatim `Authorization` header, when present.
    pub authorization: Option<String>,
    /// Principal id resolved by the gateway authorizer, when present.
    pub principal_id: Option<String>,
}

impl RequestEnvelope {
    /// The bearer token: the last whitespace-separated part of the
    /// `Authorization` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(|header| header.split_whitespace().last())
    }
}

/// The `pushEventsRequest` body.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEventsRequest {
    #[serde(rename = "datasetId")]
    pub dataset_id: String,

    /// A bounded batch of rows: string keys mapping to scalars or null.
    pub events: Vec<Map<String, Value>>,

    /// Optional key columns for a full-outer-join merge. Empty means append.
    #[serde(default, rename = "mergeOn")]
    pub merge_on: Vec<String>,

    #[serde(default = "default_version")]
    pub version: String,

    /// 1 = synchronous (default), 2 = enqueue.
    #[serde(default, rename = "apiVersion")]
    pub api_version: Option<u8>,
}

fn default_version() -> String {
    "1".to_string()
}

/// The presigned-upload request body.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    #[serde(rename = "editionId")]
    pub edition_id: String,
    pub filename: String,
}

fn parse_object(body: &str) -> Result<Value, UploadError> {
    let value: Value = serde_json::from_str(body).map_err(|_| UploadError::InvalidJson)?;
    if !value.is_object() {
        return Err(UploadError::SchemaViolation(
            "expected a JSON object".to_string(),
        ));
    }
    Ok(value)
}

/// Parse and validate a push-events body.
pub fn parse_push_request(body: &str) -> Result<PushEventsRequest, UploadError> {
    let value = parse_object(body)?;
    let request: PushEventsRequest =
        serde_json::from_value(value).map_err(|e| UploadError::SchemaViolation(e.to_string()))?;

    if request.dataset_id.is_empty() {
        return Err(UploadError::SchemaViolation(
            "'datasetId' must be a non-empty string".to_string(),
        ));
    }
    if request.events.is_empty() {
        return Err(UploadError::SchemaViolation(
            "'events' must be a non-empty array".to_string(),
        ));
    }
    if let Some(version) = request.api_version {
        if version != 1 && version != 2 {
            return Err(UploadError::SchemaViolation(format!(
                "'apiVersion' must be 1 or 2, got {version}"
            )));
        }
    }
    if request.merge_on.iter().any(String::is_empty) {
        return Err(UploadError::SchemaViolation(
            "'mergeOn' entries must be non-empty strings".to_string(),
        ));
    }
    Ok(request)
}

/// Parse and validate a presigned-upload body.
pub fn parse_upload_request(body: &str) -> Result<UploadRequest, UploadError> {
    let value = parse_object(body)?;
    let request: UploadRequest =
        serde_json::from_value(value).map_err(|e| UploadError::SchemaViolation(e.to_string()))?;
    if request.filename.is_empty() {
        return Err(UploadError::SchemaViolation(
            "'filename' must be a non-empty string".to_string(),
        ));
    }
    Ok(request)
}
