//! LRU cache of decrypted version payloads, keyed by version id. Entries
//! are invalidated when their file is hard-deleted.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct PayloadCache {
    cache: Mutex<LruCache<Uuid, Vec<u8>>>,
}

impl PayloadCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, version_id: &Uuid) -> Option<Vec<u8>> {
        let mut cache = self.cache.lock().await;
        cache.get(version_id).cloned()
    }

    pub async fn put(&self, version_id: Uuid, data: Vec<u8>) {
        let mut cache = self.cache.lock().await;
        cache.put(version_id, data);
    }

    pub async fn invalidate(&self, version_id: &Uuid) {
        let mut cache = self.cache.lock().await;
        cache.pop(version_id);
    }
}
