//! The per-dataset single-writer lock.
//!
//! Backed by a conditional-write key/value table: a record existing for a
//! dataset means the lock is held, and the conditional put is the only
//! acquisition path. Acquisition retries a bounded number of times; once
//! acquired, the record is deleted on every exit path, panics included.
//!
//! A holder that dies without deleting leaves a stuck lock; operators
//! unstick it by TTL or manual delete.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{info, warn};

use uploader_core::{Config, LockStore, UploadError};

pub struct WriteLock {
    store: Arc<dyn LockStore>,
    retries: u32,
    wait: Duration,
}

impl WriteLock {
    pub fn new(store: Arc<dyn LockStore>, retries: u32, wait: Duration) -> Self {
        WriteLock {
            store,
            retries,
            wait,
        }
    }

    pub fn from_config(store: Arc<dyn LockStore>, config: &Config) -> Self {
        WriteLock::new(store, config.lock_retries, config.lock_wait)
    }

    /// Run `f` while holding the write lock for `dataset_id`.
    ///
    /// Returns `Locked` when the retry budget is exhausted without
    /// acquisition. Errors and panics from `f` release the lock before
    /// surfacing.
    pub async fn with_lock<T, F, Fut>(&self, dataset_id: &str, f: F) -> Result<T, UploadError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, UploadError>>,
    {
        let mut tries = 0;
        loop {
            if self.store.put_if_absent(dataset_id, Utc::now()).await? {
                info!(dataset_id, "write lock acquired");
                let result = AssertUnwindSafe(f()).catch_unwind().await;
                if let Err(e) = self.store.delete(dataset_id).await {
                    warn!(dataset_id, error = %e, "failed to release write lock");
                }
                return match result {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                };
            }
            tries += 1;
            if tries >= self.retries {
                warn!(dataset_id, tries, "write lock retry budget exhausted");
                return Err(UploadError::Locked);
            }
            tokio::time::sleep(self.wait).await;
        }
    }
}
