use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::DomainResult;
use crate::store::NodeStore;
use crate::types::{NodeRecord, NodeUpdate, UpdateKind};

/// In-memory authoritative view of per-node state, written through to a
/// durable store.
///
/// The cache is owned by the single pipeline consumer; it carries no
/// internal locking. Merges are last-write-wins per field with absent
/// fields never erasing known values, and every upsert refreshes exactly
/// one last-seen timestamp. A failing store write degrades to cache-only
/// operation: the merge still happens, the failure is counted.
pub struct NodeStateCache {
    records: HashMap<u32, NodeRecord>,
    store: Arc<dyn NodeStore>,
    store_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_nodes: usize,
    pub store_failures: u64,
}

impl NodeStateCache {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self {
            records: HashMap::new(),
            store,
            store_failures: 0,
        }
    }

    /// Seed the cache from the durable store. Called once before live
    /// traffic; a store error leaves the cache empty and the pipeline
    /// functional.
    pub async fn load(&mut self) -> DomainResult<usize> {
        let records = self.store.scan_all().await?;
        let count = records.len();
        for record in records {
            self.records.insert(record.node_id, record);
        }
        info!(nodes = count, "loaded existing node records");
        Ok(count)
    }

    /// Merge an update into a node's record, stamp the timestamp chosen
    /// by `kind`, and write the merged record through to the store.
    ///
    /// Returns the merged record. Store failures are absorbed here: the
    /// in-memory state remains authoritative and correct.
    pub async fn upsert(
        &mut self,
        node_id: u32,
        update: NodeUpdate,
        kind: UpdateKind,
    ) -> NodeRecord {
        let record = self
            .records
            .entry(node_id)
            .or_insert_with(|| NodeRecord::new(node_id));
        record.apply(&update);
        record.stamp(kind, Utc::now());
        let merged = record.clone();

        match self.store.put(&merged).await {
            Ok(()) => debug!(
                node_id = %format_args!("{node_id:x}"),
                shortname = merged.shortname.as_deref().unwrap_or("unnamed"),
                "stored node record"
            ),
            Err(error) => {
                self.store_failures += 1;
                warn!(
                    node_id = %format_args!("{node_id:x}"),
                    %error,
                    "store write failed, keeping cache-only state"
                );
            }
        }

        merged
    }

    pub fn get(&self, node_id: u32) -> Option<&NodeRecord> {
        self.records.get(&node_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_nodes: self.records.len(),
            store_failures: self.store_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryNodeStore;
    use crate::store::MockNodeStore;

    fn memory_cache() -> (NodeStateCache, Arc<InMemoryNodeStore>) {
        let store = Arc::new(InMemoryNodeStore::new());
        (NodeStateCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn upsert_creates_then_merges() {
        let (mut cache, _store) = memory_cache();

        cache
            .upsert(
                0xAABBCC,
                NodeUpdate {
                    shortname: Some("BB42".to_string()),
                    ..Default::default()
                },
                UpdateKind::Generic,
            )
            .await;
        let record = cache
            .upsert(
                0xAABBCC,
                NodeUpdate {
                    latitude: Some(37.7749),
                    longitude: Some(-122.4194),
                    ..Default::default()
                },
                UpdateKind::Location,
            )
            .await;

        assert_eq!(record.shortname.as_deref(), Some("BB42"));
        assert_eq!(record.latitude, Some(37.7749));
        assert!(record.last_seen.is_some());
        assert!(record.last_seen_location.is_some());
        assert!(record.last_seen_battery.is_none());
    }

    #[tokio::test]
    async fn merge_is_monotone_across_interleaved_updates() {
        let (mut cache, _store) = memory_cache();

        cache
            .upsert(
                1,
                NodeUpdate {
                    voltage: Some(24.0),
                    ..Default::default()
                },
                UpdateKind::Battery,
            )
            .await;
        cache
            .upsert(1, NodeUpdate::default(), UpdateKind::Generic)
            .await;
        let record = cache
            .upsert(
                1,
                NodeUpdate {
                    voltage: Some(25.5),
                    ..Default::default()
                },
                UpdateKind::Battery,
            )
            .await;

        // Last non-null value wins; the interleaved empty update changed
        // nothing.
        assert_eq!(record.last_known_voltage, Some(25.5));
    }

    #[tokio::test]
    async fn timestamp_selection_per_kind() {
        let (mut cache, _store) = memory_cache();

        let record = cache
            .upsert(
                1,
                NodeUpdate {
                    voltage: Some(25.0),
                    ..Default::default()
                },
                UpdateKind::Battery,
            )
            .await;
        assert!(record.last_seen_battery.is_some());
        assert!(record.last_seen_location.is_none());
        assert!(record.last_seen.is_none());

        let battery_seen = record.last_seen_battery;
        let record = cache
            .upsert(
                1,
                NodeUpdate {
                    latitude: Some(1.0),
                    ..Default::default()
                },
                UpdateKind::Location,
            )
            .await;
        assert_eq!(record.last_seen_battery, battery_seen);
        assert!(record.last_seen_location.is_some());
    }

    #[tokio::test]
    async fn writes_through_to_store() {
        let (mut cache, store) = memory_cache();
        cache
            .upsert(
                9,
                NodeUpdate {
                    shortname: Some("BB09".to_string()),
                    ..Default::default()
                },
                UpdateKind::Generic,
            )
            .await;

        let stored = store.get(9).await.unwrap().unwrap();
        assert_eq!(stored.shortname.as_deref(), Some("BB09"));
    }

    #[tokio::test]
    async fn load_seeds_from_store() {
        let store = Arc::new(InMemoryNodeStore::new());
        store
            .seed(vec![NodeRecord {
                node_id: 5,
                shortname: Some("BB05".to_string()),
                ..Default::default()
            }])
            .await;

        let mut cache = NodeStateCache::new(store);
        assert_eq!(cache.load().await.unwrap(), 1);
        assert_eq!(cache.get(5).unwrap().shortname.as_deref(), Some("BB05"));
    }

    #[tokio::test]
    async fn store_failure_keeps_cache_authoritative() {
        let mut store = MockNodeStore::new();
        store
            .expect_put()
            .returning(|_| Err(anyhow::anyhow!("store down").into()));

        let mut cache = NodeStateCache::new(Arc::new(store));
        let record = cache
            .upsert(
                3,
                NodeUpdate {
                    shortname: Some("BB03".to_string()),
                    ..Default::default()
                },
                UpdateKind::Generic,
            )
            .await;

        assert_eq!(record.shortname.as_deref(), Some("BB03"));
        assert_eq!(cache.get(3).unwrap().shortname.as_deref(), Some("BB03"));
        assert_eq!(cache.stats().store_failures, 1);
    }
}
