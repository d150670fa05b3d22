//! Local-disk object store. Objects live under `<base>/objects/` with the
//! key flattened to a single path component; signed URLs are HMAC-bearing
//! `file://` capabilities the adapter can verify itself.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::prelude::*;
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::fs;

use crate::error::{EngineError, NotFoundKind, Result};
use crate::store::{ObjectStore, SignedUrlMode};

pub struct DiskObjectStore {
    objects_path: PathBuf,
    signing_key: hmac::Key,
}

fn io_to_engine(err: std::io::Error) -> EngineError {
    match err.kind() {
        std::io::ErrorKind::NotFound => {
            EngineError::not_found(NotFoundKind::BackingObject, "disk object")
        }
        _ => EngineError::StorageUnavailable(err.to_string()),
    }
}

impl DiskObjectStore {
    pub async fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let objects_path = base_path.as_ref().join("objects");
        fs::create_dir_all(&objects_path).await?;

        let rng = SystemRandom::new();
        let mut secret = [0u8; 32];
        rng.fill(&mut secret)
            .map_err(|_| EngineError::StorageUnavailable("randomness source failed".into()))?;
        Ok(Self {
            objects_path,
            signing_key: hmac::Key::new(hmac::HMAC_SHA256, &secret),
        })
    }

    /// Construction with a caller-held signing secret, so URLs stay
    /// verifiable across process restarts.
    pub async fn with_signing_secret<P: AsRef<Path>>(base_path: P, secret: &[u8]) -> Result<Self> {
        let objects_path = base_path.as_ref().join("objects");
        fs::create_dir_all(&objects_path).await?;
        Ok(Self {
            objects_path,
            signing_key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        })
    }

    /// Keys contain '/' separators; flatten them so a key can never escape
    /// the objects directory.
    fn object_path(&self, key: &str) -> PathBuf {
        self.objects_path.join(key.replace('/', "_"))
    }

    fn sign(&self, key: &str, expires: u64, mode: SignedUrlMode) -> String {
        let message = format!("{}|{}|{}", key, expires, mode.as_str());
        let tag = hmac::sign(&self.signing_key, message.as_bytes());
        BASE64_URL_SAFE_NO_PAD.encode(tag.as_ref())
    }

    /// Checks a token previously issued by `signed_url` for this key/mode
    /// and that it has not expired.
    pub fn verify_url_token(
        &self,
        key: &str,
        expires: u64,
        mode: SignedUrlMode,
        token: &str,
    ) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(u64::MAX);
        if now > expires {
            return false;
        }
        let message = format!("{}|{}|{}", key, expires, mode.as_str());
        let tag = BASE64_URL_SAFE_NO_PAD.decode(token.as_bytes());
        match tag {
            Ok(tag) => hmac::verify(&self.signing_key, message.as_bytes(), &tag).is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key);
        let tmp = path.with_extension("partial");
        // Write-then-rename so a crash never leaves a half object under the
        // final key.
        fs::write(&tmp, data).await.map_err(io_to_engine)?;
        fs::rename(&tmp, &path).await.map_err(io_to_engine)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::not_found(NotFoundKind::BackingObject, key))
            }
            Err(e) => Err(EngineError::StorageUnavailable(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Deleting an absent object is not a failure; the bytes are gone.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::StorageUnavailable(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match fs::try_exists(self.object_path(key)).await {
            Ok(found) => Ok(found),
            Err(e) => Err(EngineError::StorageUnavailable(e.to_string())),
        }
    }

    async fn signed_url(&self, key: &str, ttl: Duration, mode: SignedUrlMode) -> Result<String> {
        let expires = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?
            .as_secs()
            + ttl.as_secs();
        let token = self.sign(key, expires, mode);
        let path = self.object_path(key);
        Ok(format!(
            "file://{}?mode={}&expires={}&sig={}",
            path.display(),
            mode.as_str(),
            expires,
            token
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (DiskObjectStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let store = DiskObjectStore::new(dir.path()).await.expect("store");
        (store, dir)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let (store, _dir) = store().await;
        store.put("objects/a/b", b"payload").await.expect("put");
        assert!(store.exists("objects/a/b").await.expect("exists"));
        assert_eq!(store.get("objects/a/b").await.expect("get"), b"payload");

        store.delete("objects/a/b").await.expect("delete");
        assert!(!store.exists("objects/a/b").await.expect("exists"));
        assert!(matches!(
            store.get("objects/a/b").await,
            Err(EngineError::NotFound { .. })
        ));
        // Deleting again is a no-op.
        store.delete("objects/a/b").await.expect("idempotent delete");
    }

    #[tokio::test]
    async fn signed_url_verifies_and_expires() {
        let (store, _dir) = store().await;
        let url = store
            .signed_url("objects/x", Duration::from_secs(60), SignedUrlMode::Read)
            .await
            .expect("sign");
        let (_, query) = url.split_once('?').expect("query");
        let mut expires = 0u64;
        let mut sig = "";
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse().expect("expiry"),
                Some(("sig", v)) => sig = v,
                _ => {}
            }
        }
        assert!(store.verify_url_token("objects/x", expires, SignedUrlMode::Read, sig));
        // Wrong key, wrong mode, expired timestamp: all refused.
        assert!(!store.verify_url_token("objects/y", expires, SignedUrlMode::Read, sig));
        assert!(!store.verify_url_token("objects/x", expires, SignedUrlMode::Write, sig));
        assert!(!store.verify_url_token("objects/x", 1, SignedUrlMode::Read, sig));
    }
}
