//! Shared wiring for the handler tests: a registry backed entirely by
//! in-memory collaborators.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use object_store::memory::InMemory;

use uploader_core::{AccessRights, Config, Dataset, DatasetSource, RequestEnvelope, SourceType};
use uploader_handlers::Registry;
use uploader_io::{
    AwsCredentials, MemoryEventQueue, MemoryLockStore, MemoryMetadataApi, MemoryStatusApi,
    MemorySubscriptionStore, RecordingEmailGateway, SchemaDriftNotifier, SignedPostGenerator,
    StaticAuthorizer, TableStore, WriteLock,
};

pub struct Harness {
    pub registry: Registry,
    pub metadata: Arc<MemoryMetadataApi>,
    pub queue: Arc<MemoryEventQueue>,
    pub lock_store: Arc<MemoryLockStore>,
    pub subscriptions: Arc<MemorySubscriptionStore>,
    pub email: Arc<RecordingEmailGateway>,
    pub status: Arc<MemoryStatusApi>,
}

pub fn test_config(enable_auth: bool) -> Config {
    Config {
        bucket: "testbucket".into(),
        region: "eu-west-1".into(),
        metadata_api_url: "http://metadata.local".into(),
        status_api_url: "http://status.local".into(),
        event_queue_name: "dataset-events.fifo".into(),
        email_api_url: "http://email.local".into(),
        email_api_key: "top-secret".into(),
        metadata_api_token: None,
        authorizer_api: enable_auth.then(|| "http://authorizer.local".into()),
        enable_auth,
        // Millisecond waits with a deep retry budget; the contention tests
        // hold the lock for milliseconds, not seconds.
        lock_retries: 50,
        lock_wait: Duration::from_millis(2),
    }
}

pub fn harness_with(enable_auth: bool, allow: bool) -> Harness {
    let metadata = Arc::new(MemoryMetadataApi::default());
    let queue = Arc::new(MemoryEventQueue::default());
    let lock_store = Arc::new(MemoryLockStore::default());
    let subscriptions = Arc::new(MemorySubscriptionStore::default());
    let email = Arc::new(RecordingEmailGateway::default());
    let status = Arc::new(MemoryStatusApi::default());
    let config = test_config(enable_auth);

    let registry = Registry {
        store: TableStore::new(Arc::new(InMemory::new()), &config.bucket),
        metadata: metadata.clone(),
        lock: WriteLock::from_config(lock_store.clone(), &config),
        queue: queue.clone(),
        notifier: SchemaDriftNotifier::new(subscriptions.clone(), email.clone()),
        status: status.clone(),
        authorizer: Arc::new(if allow {
            StaticAuthorizer::allow_all()
        } else {
            StaticAuthorizer::deny_all()
        }),
        signed_post: SignedPostGenerator::new(
            AwsCredentials {
                access_key_id: "AKIAEXAMPLE".into(),
                secret_access_key: "secret".into(),
                session_token: None,
            },
            &config.region,
            &config.bucket,
        ),
        config,
    };

    Harness {
        registry,
        metadata,
        queue,
        lock_store,
        subscriptions,
        email,
        status,
    }
}

pub fn harness() -> Harness {
    harness_with(false, true)
}

pub fn dataset(id: &str, access_rights: AccessRights, source_type: SourceType) -> Dataset {
    Dataset {
        id: id.into(),
        access_rights,
        source: DatasetSource { source_type },
        parent_id: None,
    }
}

pub fn envelope(body: &str) -> RequestEnvelope {
    RequestEnvelope {
        body: body.to_string(),
        authorization: Some("Bearer test-token".into()),
        principal_id: Some("test-user".into()),
    }
}

pub fn body_json(response: &uploader_core::Response) -> serde_json::Value {
    serde_json::from_str(&response.body).unwrap()
}
