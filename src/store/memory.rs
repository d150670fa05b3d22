//! In-memory object store. Used by tests and the quickest way to stand the
//! engine up without touching disk; carries fault-injection and tamper
//! hooks for the failure-path scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{EngineError, NotFoundKind, Result};
use crate::store::{ObjectStore, SignedUrlMode};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicU32,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` put calls fail with `StorageUnavailable`.
    pub fn fail_next_puts(&self, n: u32) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }

    /// Flips the last byte of a stored object in place, for integrity
    /// scenarios.
    pub async fn tamper_last_byte(&self, key: &str) -> Result<()> {
        let mut objects = self.objects.lock().await;
        let data = objects
            .get_mut(key)
            .ok_or_else(|| EngineError::not_found(NotFoundKind::BackingObject, key))?;
        if let Some(last) = data.last_mut() {
            *last ^= 0x01;
        }
        Ok(())
    }

    /// Drops an object without going through `delete`, simulating storage
    /// drift behind intact metadata.
    pub async fn lose_object(&self, key: &str) {
        self.objects.lock().await.remove(key);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let pending = self.fail_puts.load(Ordering::SeqCst);
        if pending > 0
            && self
                .fail_puts
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(EngineError::StorageUnavailable("injected put failure".into()));
        }
        self.objects.lock().await.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::not_found(NotFoundKind::BackingObject, key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn signed_url(&self, key: &str, ttl: Duration, mode: SignedUrlMode) -> Result<String> {
        Ok(format!(
            "memory://{}?mode={}&ttl={}",
            key,
            mode.as_str(),
            ttl.as_secs()
        ))
    }
}
