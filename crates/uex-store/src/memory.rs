use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

/// In-memory hot cache of candidate-name lists, backed by moka.
///
/// Lists are keyed by the filter that produced them and dropped wholesale
/// after every completed import.
pub struct NameCache {
    inner: Cache<String, Arc<Vec<String>>>,
}

impl NameCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<Vec<String>>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, names: Arc<Vec<String>>) {
        self.inner.insert(key, names).await;
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}
