use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::DomainResult;
use crate::store::NodeStore;
use crate::types::NodeRecord;

/// In-memory NodeStore used when no database is configured (cache-only
/// degraded mode) and in tests.
pub struct InMemoryNodeStore {
    records: Arc<RwLock<HashMap<u32, NodeRecord>>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Pre-populate the store, for tests that exercise cache preload.
    pub async fn seed(&self, records: Vec<NodeRecord>) {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.node_id, record);
        }
    }
}

impl Default for InMemoryNodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get(&self, node_id: u32) -> DomainResult<Option<NodeRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&node_id).cloned())
    }

    async fn put(&self, record: &NodeRecord) -> DomainResult<()> {
        let mut records = self.records.write().await;
        records.insert(record.node_id, record.clone());
        Ok(())
    }

    async fn scan_all(&self) -> DomainResult<Vec<NodeRecord>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryNodeStore::new();
        let record = NodeRecord {
            node_id: 7,
            shortname: Some("BB01".to_string()),
            ..Default::default()
        };
        store.put(&record).await.unwrap();
        assert_eq!(store.get(7).await.unwrap(), Some(record));
        assert_eq!(store.get(8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_all_returns_every_record() {
        let store = InMemoryNodeStore::new();
        store
            .seed(vec![NodeRecord::new(1), NodeRecord::new(2)])
            .await;
        let mut ids: Vec<u32> = store
            .scan_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.node_id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }
}
