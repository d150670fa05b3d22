pub mod disk;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use disk::DiskObjectStore;
pub use memory::MemoryObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedUrlMode {
    Read,
    Write,
}

impl SignedUrlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignedUrlMode::Read => "read",
            SignedUrlMode::Write => "write",
        }
    }
}

/// Uniform put/get/delete/stat/sign surface over an opaque blob backend.
/// Implementations map their own outage/timeout failures to
/// `EngineError::StorageUnavailable` so callers can apply the retry policy.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn signed_url(&self, key: &str, ttl: Duration, mode: SignedUrlMode) -> Result<String>;
}
