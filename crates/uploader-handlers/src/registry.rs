//! The process-wide service registry.

use std::sync::Arc;

use uploader_core::{Config, EventQueue, MetadataApi, ResourceAuthorizer, StatusApi};
use uploader_io::{SchemaDriftNotifier, SignedPostGenerator, TableStore, WriteLock};

/// Every collaborator a handler needs, initialized once at startup and
/// passed explicitly. Binaries wire the production backends; tests wire the
/// in-memory ones.
pub struct Registry {
    pub config: Config,
    pub store: TableStore,
    pub metadata: Arc<dyn MetadataApi>,
    pub lock: WriteLock,
    pub queue: Arc<dyn EventQueue>,
    pub notifier: SchemaDriftNotifier,
    pub status: Arc<dyn StatusApi>,
    pub authorizer: Arc<dyn ResourceAuthorizer>,
    pub signed_post: SignedPostGenerator,
}
