//! In-process query cache

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::broadcast;

use super::{CacheError, QueryCache, QueryKey, Snapshot};

/// Emitted after every successful write or eviction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    /// New version, or `None` when the snapshot was evicted.
    pub version: Option<u64>,
}

/// A `QueryCache` backed by a map behind a lock.
///
/// Versions are per key and start at 1 on first write.
pub struct InMemoryCache {
    entries: RwLock<HashMap<QueryKey, Snapshot>>,
    events_tx: broadcast::Sender<CacheEvent>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(HashMap::new()),
            events_tx,
        }
    }

    /// Subscribe to write notifications (list views re-render on these).
    pub fn changes(&self) -> broadcast::Receiver<CacheEvent> {
        self.events_tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, key: &QueryKey, version: Option<u64>) {
        let _ = self.events_tx.send(CacheEvent {
            key: key.clone(),
            version,
        });
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache for InMemoryCache {
    fn read_query(&self, key: &QueryKey) -> Option<Snapshot> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn write_query(&self, key: &QueryKey, data: Value) -> u64 {
        let version = {
            let mut entries = match self.entries.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let version = entries.get(key).map(|s| s.version + 1).unwrap_or(1);
            entries.insert(key.clone(), Snapshot { data, version });
            version
        };
        self.notify(key, Some(version));
        version
    }

    fn write_query_if(
        &self,
        key: &QueryKey,
        data: Value,
        expected_version: u64,
    ) -> Result<u64, CacheError> {
        let version = {
            let mut entries = match self.entries.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let current = entries
                .get_mut(key)
                .ok_or_else(|| CacheError::Missing(key.clone()))?;
            if current.version != expected_version {
                return Err(CacheError::VersionConflict {
                    key: key.clone(),
                    expected: expected_version,
                    found: current.version,
                });
            }
            current.data = data;
            current.version += 1;
            current.version
        };
        self.notify(key, Some(version));
        Ok(version)
    }

    fn evict(&self, key: &QueryKey) -> bool {
        let removed = match self.entries.write() {
            Ok(mut entries) => entries.remove(key).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(key).is_some(),
        };
        if removed {
            self.notify(key, None);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_versions_increase_per_key() {
        let cache = InMemoryCache::new();
        let books = QueryKey::new("GetAvailableBooks");
        let authors = QueryKey::new("GetAuthors");

        assert_eq!(cache.write_query(&books, json!({"getAvailableBooks": []})), 1);
        assert_eq!(cache.write_query(&books, json!({"getAvailableBooks": []})), 2);
        assert_eq!(cache.write_query(&authors, json!({"getAuthors": []})), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_conditional_write_detects_lost_update() {
        let cache = InMemoryCache::new();
        let key = QueryKey::new("GetAllOrders");
        cache.write_query(&key, json!({"getAllOrders": []}));

        let seen = cache.read_query(&key).unwrap();
        cache.write_query(&key, json!({"getAllOrders": [{"id": 1}]}));

        let err = cache
            .write_query_if(&key, json!({"getAllOrders": [{"id": 2}]}), seen.version)
            .unwrap_err();
        assert_eq!(
            err,
            CacheError::VersionConflict {
                key: key.clone(),
                expected: 1,
                found: 2
            }
        );
        assert_eq!(cache.read_query(&key).unwrap().data, json!({"getAllOrders": [{"id": 1}]}));
    }

    #[test]
    fn test_conditional_write_never_creates() {
        let cache = InMemoryCache::new();
        let key = QueryKey::new("GetAuthors");
        let err = cache.write_query_if(&key, json!({}), 0).unwrap_err();
        assert_eq!(err, CacheError::Missing(key.clone()));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let cache = InMemoryCache::new();
        let mut changes = cache.changes();
        let key = QueryKey::new("GetUserCheckouts");

        cache.write_query(&key, json!({"getUserCheckouts": []}));
        assert!(cache.evict(&key));
        assert!(!cache.evict(&key));

        assert_eq!(changes.recv().await.unwrap(), CacheEvent { key: key.clone(), version: Some(1) });
        assert_eq!(changes.recv().await.unwrap(), CacheEvent { key, version: None });
    }
}
