//! # Uploader I/O - Storage and Service Implementations
//!
//! Concrete implementations of the external collaborators consumed by the
//! ingestion pipeline:
//!
//! - **Table Store**: the columnar table at a storage path, read and
//!   overwritten as parquet through any `ObjectStore` backend (S3 in
//!   production, local filesystem or memory elsewhere)
//! - **Metadata Client**: dataset records, edition minting, and distribution
//!   descriptors over HTTP
//! - **Write Lock**: the per-dataset single-writer lock over a
//!   conditional-write key/value table, with bounded retry and release on
//!   every exit path
//! - **Schema-Drift Notifier**: subscriber lookup and alert email composition
//! - **Status Client** and **Authorizer**: thin HTTP clients
//! - **Signed POST**: time-limited upload credentials for file-typed datasets
//! - **Memory implementations** of the key/value tables and the FIFO queue,
//!   used by tests and the local runner

pub mod alerts;
pub mod authorizer;
pub mod email;
pub mod lock;
pub mod memory;
pub mod metadata;
pub mod signed_post;
pub mod status;
pub mod store;

pub use alerts::SchemaDriftNotifier;
pub use authorizer::HttpAuthorizer;
pub use email::EmailClient;
pub use lock::WriteLock;
pub use memory::{
    FailingEmailGateway, MemoryEventQueue, MemoryLockStore, MemoryMetadataApi, MemoryStatusApi,
    MemorySubscriptionStore, RecordingEmailGateway, StaticAuthorizer,
};
pub use metadata::MetadataClient;
pub use signed_post::{AwsCredentials, SignedPost, SignedPostGenerator, POST_EXPIRY_SECONDS};
pub use status::StatusClient;
pub use store::TableStore;
