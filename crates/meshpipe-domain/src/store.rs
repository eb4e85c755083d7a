use async_trait::async_trait;

use crate::error::DomainResult;
use crate::types::NodeRecord;

/// Durable key/value store for node records, keyed by node id.
///
/// The core treats this as eventually visible: `put` is a full-record
/// overwrite, `scan_all` exists for cache preload at startup. An
/// implementation may be as small as a HashMap; the pipeline keeps
/// working (cache-only) when the backing service is down.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get(&self, node_id: u32) -> DomainResult<Option<NodeRecord>>;

    async fn put(&self, record: &NodeRecord) -> DomainResult<()>;

    async fn scan_all(&self) -> DomainResult<Vec<NodeRecord>>;
}
