//! # Uploader Core - Shared Types and Service Contracts
//!
//! This crate provides the foundational types and abstractions for the data
//! uploader: the dataset model, the error taxonomy with its HTTP-style status
//! mapping, request/response envelopes, storage-path derivation, environment
//! configuration, and the traits behind which every external collaborator
//! (lock table, event queue, metadata API, email gateway, status API,
//! resource authorizer) is consumed.
//!
//! ## Key Components
//!
//! - **Dataset Model**: dataset records, access-rights driven confidentiality,
//!   edition identifiers and storage paths
//! - **Error Taxonomy**: one error enum covering every failure the pipeline
//!   can surface, each kind carrying its outward status code and message
//! - **Service Traits**: narrow async interfaces for the key-value lock
//!   table, the FIFO event queue, subscriptions, email, status and metadata
//! - **Envelopes**: parsed request envelopes and the gateway response shape
//!
//! ## Example Usage
//!
//! ```rust
//! use uploader_core::{Dataset, EditionId, Stage, dataset_prefix};
//!
//! # fn example(dataset: &Dataset) {
//! let latest = EditionId::latest("trees", "1");
//! let prefix = dataset_prefix(dataset, &latest, Stage::Processed);
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod envelope;
pub mod error;
pub mod paths;
pub mod response;
pub mod services;

pub use config::{Config, ConfigError};
pub use dataset::{
    AccessRights, Confidentiality, Dataset, DatasetSource, EditionId, EditionRef, SourceType,
};
pub use envelope::{
    parse_push_request, parse_upload_request, PushEventsRequest, RequestEnvelope, UploadRequest,
    MAX_EVENT_BODY_BYTES,
};
pub use error::{Result, UploadError};
pub use paths::{dataset_key, dataset_prefix, storage_url, Stage};
pub use response::Response;
pub use services::{
    generate_trace_id, DistributionInput, EmailGateway, EmailMessage, EventQueue, LockStore,
    MetadataApi, QueueMessage, ResourceAuthorizer, StatusApi, StatusTrace, SubscriptionStore,
    TraceStatus,
};

/// Scope required on the caller token for every write operation.
pub const WRITE_SCOPE: &str = "okdata:dataset:write";

/// Resource string for a dataset, as understood by the authorizer.
pub fn dataset_resource(dataset_id: &str) -> String {
    format!("okdata:dataset:{dataset_id}")
}
