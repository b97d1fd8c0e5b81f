//! In-memory implementations of the external key/value tables, the FIFO
//! queue, and the HTTP collaborators. Used by the test suites and by the
//! local runner; production deployments wire the real backends instead.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use uploader_core::{
    Dataset, DistributionInput, EditionId, EmailGateway, EmailMessage, EventQueue, LockStore,
    MetadataApi, QueueMessage, ResourceAuthorizer, StatusApi, StatusTrace, SubscriptionStore,
    UploadError,
};

/// Conditional-write lock table.
#[derive(Default)]
pub struct MemoryLockStore {
    records: Mutex<HashMap<String, DateTime<Utc>>>,
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn put_if_absent(
        &self,
        dataset_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, UploadError> {
        let mut records = self.records.lock().await;
        if records.contains_key(dataset_id) {
            return Ok(false);
        }
        records.insert(dataset_id.to_string(), timestamp);
        Ok(true)
    }

    async fn delete(&self, dataset_id: &str) -> Result<(), UploadError> {
        self.records.lock().await.remove(dataset_id);
        Ok(())
    }
}

#[derive(Default)]
struct QueueInner {
    groups: IndexMap<String, VecDeque<QueueMessage>>,
    seen: HashSet<[u8; 32]>,
}

/// FIFO queue with per-group ordering and content-based deduplication.
#[derive(Default)]
pub struct MemoryEventQueue {
    inner: Mutex<QueueInner>,
}

fn content_hash(body: &str) -> [u8; 32] {
    Sha256::digest(body.as_bytes()).into()
}

#[async_trait]
impl EventQueue for MemoryEventQueue {
    async fn send(
        &self,
        group_id: &str,
        body: &str,
        trace_id: &str,
    ) -> Result<(), UploadError> {
        let mut inner = self.inner.lock().await;
        if !inner.seen.insert(content_hash(body)) {
            debug!(group_id, "message deduplicated by content");
            return Ok(());
        }
        inner
            .groups
            .entry(group_id.to_string())
            .or_default()
            .push_back(QueueMessage {
                group_id: group_id.to_string(),
                body: body.to_string(),
                trace_id: Some(trace_id.to_string()),
            });
        Ok(())
    }

    async fn receive(&self) -> Result<Option<QueueMessage>, UploadError> {
        let mut inner = self.inner.lock().await;
        let mut received = None;
        for queue in inner.groups.values_mut() {
            if let Some(message) = queue.pop_front() {
                received = Some(message);
                break;
            }
        }
        if let Some(message) = &received {
            let hash = content_hash(&message.body);
            inner.seen.remove(&hash);
        }
        Ok(received)
    }
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: Mutex<HashMap<String, Vec<String>>>,
}

impl MemorySubscriptionStore {
    pub async fn subscribe(&self, dataset_id: &str, subscribers: Vec<String>) {
        self.subscriptions
            .lock()
            .await
            .insert(dataset_id.to_string(), subscribers);
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn subscribers(&self, dataset_id: &str) -> Result<Vec<String>, UploadError> {
        Ok(self
            .subscriptions
            .lock()
            .await
            .get(dataset_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records outbound emails instead of sending them.
#[derive(Default)]
pub struct RecordingEmailGateway {
    messages: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmailGateway {
    pub async fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl EmailGateway for RecordingEmailGateway {
    async fn send(&self, message: &EmailMessage) -> Result<(), UploadError> {
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}

/// An email gateway that always fails, for failure-isolation tests.
#[derive(Default)]
pub struct FailingEmailGateway;

#[async_trait]
impl EmailGateway for FailingEmailGateway {
    async fn send(&self, _message: &EmailMessage) -> Result<(), UploadError> {
        Err(UploadError::internal(anyhow::anyhow!(
            "email gateway unavailable"
        )))
    }
}

/// Records status traces and echoes trace ids back.
#[derive(Default)]
pub struct MemoryStatusApi {
    traces: Mutex<Vec<StatusTrace>>,
}

impl MemoryStatusApi {
    pub async fn traces(&self) -> Vec<StatusTrace> {
        self.traces.lock().await.clone()
    }
}

#[async_trait]
impl StatusApi for MemoryStatusApi {
    async fn create_trace(&self, trace: &StatusTrace) -> Result<String, UploadError> {
        self.traces.lock().await.push(trace.clone());
        Ok(trace.trace_id.clone())
    }

    async fn update_trace(&self, trace: &StatusTrace) -> Result<(), UploadError> {
        self.traces.lock().await.push(trace.clone());
        Ok(())
    }
}

/// Authorizer with a fixed answer.
pub struct StaticAuthorizer {
    allow: bool,
}

impl StaticAuthorizer {
    pub fn allow_all() -> Self {
        StaticAuthorizer { allow: true }
    }

    pub fn deny_all() -> Self {
        StaticAuthorizer { allow: false }
    }
}

#[async_trait]
impl ResourceAuthorizer for StaticAuthorizer {
    async fn has_access(
        &self,
        _token: &str,
        _scope: &str,
        _resource: &str,
    ) -> Result<bool, UploadError> {
        Ok(self.allow)
    }
}

#[derive(Default)]
struct MetadataInner {
    datasets: HashMap<String, Dataset>,
    versions: HashSet<String>,
    editions: HashSet<String>,
    distributions: Vec<(String, DistributionInput)>,
}

/// In-memory stand-in for the metadata service. Mints unique edition ids
/// the way the real service owns identity.
#[derive(Default)]
pub struct MemoryMetadataApi {
    inner: Mutex<MetadataInner>,
    edition_counter: AtomicU32,
    conflict_on_create: AtomicBool,
}

impl MemoryMetadataApi {
    pub async fn put_dataset(&self, dataset: Dataset) {
        let mut inner = self.inner.lock().await;
        inner.versions.insert(format!("{}/1", dataset.id));
        inner.datasets.insert(dataset.id.clone(), dataset);
    }

    pub async fn put_version(&self, dataset_id: &str, version: &str) {
        self.inner
            .lock()
            .await
            .versions
            .insert(format!("{dataset_id}/{version}"));
    }

    pub async fn distributions(&self) -> Vec<(String, DistributionInput)> {
        self.inner.lock().await.distributions.clone()
    }

    /// Make the next `create_edition` report a conflict.
    pub fn set_edition_conflict(&self, conflict: bool) {
        self.conflict_on_create.store(conflict, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataApi for MemoryMetadataApi {
    async fn dataset(&self, dataset_id: &str) -> Result<Dataset, UploadError> {
        self.inner
            .lock()
            .await
            .datasets
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| UploadError::DatasetNotFound(dataset_id.to_string()))
    }

    async fn validate_edition(&self, edition: &EditionId) -> Result<bool, UploadError> {
        Ok(self
            .inner
            .lock()
            .await
            .editions
            .contains(&edition.to_string()))
    }

    async fn validate_version(
        &self,
        dataset_id: &str,
        version: &str,
    ) -> Result<bool, UploadError> {
        Ok(self
            .inner
            .lock()
            .await
            .versions
            .contains(&format!("{dataset_id}/{version}")))
    }

    async fn create_edition(
        &self,
        _token: Option<&str>,
        dataset_id: &str,
        version: &str,
    ) -> Result<String, UploadError> {
        if self.conflict_on_create.load(Ordering::SeqCst) {
            return Err(UploadError::DataExists(format!(
                "Edition on datasetId {dataset_id} already exists"
            )));
        }
        let stamp = Utc::now().format("%Y%m%dT%H%M%S");
        let serial = self.edition_counter.fetch_add(1, Ordering::SeqCst);
        let edition_id = format!("{dataset_id}/{version}/{stamp}-{serial}");
        self.inner.lock().await.editions.insert(edition_id.clone());
        Ok(edition_id)
    }

    async fn create_distribution(
        &self,
        _token: Option<&str>,
        edition: &EditionId,
        distribution: &DistributionInput,
    ) -> Result<String, UploadError> {
        let mut inner = self.inner.lock().await;
        inner
            .distributions
            .push((edition.to_string(), distribution.clone()));
        Ok(format!("dist-{}", inner.distributions.len()))
    }
}
