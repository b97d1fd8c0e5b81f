//! Service traits for the external collaborators.
//!
//! The lock table, event queue, subscription store, email gateway, status
//! API, metadata service, and resource authorizer are all owned elsewhere;
//! the uploader consumes them through these narrow interfaces. Concrete
//! implementations live in `uploader-io`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dataset::{Dataset, EditionId};
use crate::error::UploadError;

/// A trace id: `<datasetId>-<uuid>`, truncated to 80 characters.
pub fn generate_trace_id(dataset_id: &str) -> String {
    let mut trace_id = format!("{dataset_id}-{}", Uuid::new_v4());
    trace_id.truncate(80);
    trace_id
}

/// Conditional-write key/value table backing the per-dataset write lock.
/// Existence of an item means the lock is held.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Put the lock record only if no record exists for the dataset.
    /// Returns `false` when the conditional check fails (lock already held).
    async fn put_if_absent(
        &self,
        dataset_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, UploadError>;

    async fn delete(&self, dataset_id: &str) -> Result<(), UploadError>;
}

/// A message received from the event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub group_id: String,
    pub body: String,
    pub trace_id: Option<String>,
}

/// FIFO queue with per-group ordering and content-based deduplication.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Enqueue a raw body. Failures map to `QueueUnavailable`.
    async fn send(&self, group_id: &str, body: &str, trace_id: &str)
        -> Result<(), UploadError>;

    /// Receive at most one message; consumers are triggered one message at a
    /// time.
    async fn receive(&self) -> Result<Option<QueueMessage>, UploadError>;
}

/// Lookup of schema-drift subscribers per dataset.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Subscriber email addresses; empty when nobody subscribes.
    async fn subscribers(&self, dataset_id: &str) -> Result<Vec<String>, UploadError>;
}

/// An outbound email, field names matching the gateway contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    #[serde(rename = "mottakerepost")]
    pub recipients: Vec<String>,
    #[serde(rename = "avsenderepost")]
    pub sender_address: String,
    #[serde(rename = "avsendernavn")]
    pub sender_name: String,
    #[serde(rename = "emne")]
    pub subject: String,
    #[serde(rename = "meldingskropp")]
    pub body: String,
}

#[async_trait]
pub trait EmailGateway: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), UploadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStatus {
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "FINISHED")]
    Finished,
}

/// One status trace entry for an ingestion or upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTrace {
    pub trace_id: String,
    pub domain: String,
    pub domain_id: String,
    pub component: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_status: Option<TraceStatus>,
}

impl StatusTrace {
    /// A fresh trace for one operation on `<datasetId>/<version>`.
    pub fn new(dataset_id: &str, version: &str, operation: &str) -> Self {
        StatusTrace {
            trace_id: generate_trace_id(dataset_id),
            domain: "dataset".to_string(),
            domain_id: format!("{dataset_id}/{version}"),
            component: "data-uploader".to_string(),
            operation: operation.to_string(),
            user: None,
            start_time: None,
            end_time: None,
            s3_path: None,
            trace_status: None,
        }
    }
}

#[async_trait]
pub trait StatusApi: Send + Sync {
    /// Record a new trace; returns the trace id to hand back to the caller.
    async fn create_trace(&self, trace: &StatusTrace) -> Result<String, UploadError>;

    /// Append an update (e.g. a terminal `FINISHED`) to an existing trace.
    async fn update_trace(&self, trace: &StatusTrace) -> Result<(), UploadError>;
}

/// Input for a distribution descriptor referencing the files of an edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionInput {
    pub distribution_type: String,
    pub content_type: String,
    pub filenames: Vec<String>,
}

impl DistributionInput {
    pub fn parquet(filenames: Vec<String>) -> Self {
        DistributionInput {
            distribution_type: "file".to_string(),
            content_type: "application/vnd.apache.parquet".to_string(),
            filenames,
        }
    }
}

/// The metadata service, owner of dataset, version, and edition identity.
#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn dataset(&self, dataset_id: &str) -> Result<Dataset, UploadError>;

    /// True iff the edition exists and the returned id matches exactly.
    async fn validate_edition(&self, edition: &EditionId) -> Result<bool, UploadError>;

    /// True iff `datasetId/version` names an existing version.
    async fn validate_version(&self, dataset_id: &str, version: &str)
        -> Result<bool, UploadError>;

    /// Mint a new edition for `(dataset, version)`; returns the new edition
    /// id. `DataExists` when the edition already exists.
    async fn create_edition(
        &self,
        token: Option<&str>,
        dataset_id: &str,
        version: &str,
    ) -> Result<String, UploadError>;

    /// Create a distribution descriptor for a published edition; returns the
    /// distribution id. Retried on transient failures.
    async fn create_distribution(
        &self,
        token: Option<&str>,
        edition: &EditionId,
        distribution: &DistributionInput,
    ) -> Result<String, UploadError>;
}

/// Scope-based access control for dataset resources.
#[async_trait]
pub trait ResourceAuthorizer: Send + Sync {
    async fn has_access(
        &self,
        token: &str,
        scope: &str,
        resource: &str,
    ) -> Result<bool, UploadError>;
}
