//! Storage engine orchestrator. Composes validation, quota, encryption,
//! the object store and the metadata catalog into atomic-looking user
//! operations. All collaborators are injected at construction; the engine
//! holds no ambient globals.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::access::{AccessControl, AccessDecision, NoSharing, ResourceKind};
use crate::cache::PayloadCache;
use crate::catalog::{FileCatalog, NewVersionInput};
use crate::config::EngineConfig;
use crate::crypto;
use crate::error::{EngineError, NotFoundKind, Result};
use crate::folder::FolderManager;
use crate::quota::QuotaLedger;
use crate::retry::{with_retry, RetryConfig};
use crate::store::{ObjectStore, SignedUrlMode};
use crate::types::{FileRecord, FileState, FolderRecord, VersionRecord};
use crate::validation;

const STATE_KEY: &str = "state/engine.json";

#[derive(serde::Serialize, serde::Deserialize)]
struct EngineSnapshot {
    files: Vec<FileRecord>,
    versions: Vec<VersionRecord>,
    metadata: Vec<(Uuid, String, String)>,
    folders: Vec<FolderRecord>,
    quotas: Vec<crate::types::QuotaRecord>,
}

pub struct UploadRequest {
    pub owner_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub description: Option<String>,
    /// Per-upload override of the deployment encrypt-at-rest default.
    pub encrypt: Option<bool>,
    /// Client-supplied token; resubmitting the same token replays the
    /// original outcome instead of re-charging quota.
    pub idempotency_token: Option<String>,
}

impl UploadRequest {
    pub fn new(owner_id: Uuid, name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            owner_id,
            folder_id: None,
            name: name.into(),
            mime_type: mime_type.into(),
            data,
            description: None,
            encrypt: None,
            idempotency_token: None,
        }
    }
}

/// Closed set of bulk operations; unknown operations are unrepresentable.
#[derive(Debug, Clone)]
pub enum BulkOp {
    Move { folder_id: Option<Uuid> },
    SoftDelete,
    Restore,
    HardDelete,
    Tag { key: String, value: String },
}

pub struct BulkItemOutcome {
    pub file_id: Uuid,
    pub result: Result<()>,
}

#[derive(Debug)]
pub struct DownloadedFile {
    pub file: FileRecord,
    pub version: VersionRecord,
    pub data: Vec<u8>,
}

pub struct StorageEngine {
    store: Arc<dyn ObjectStore>,
    access: Arc<dyn AccessControl>,
    catalog: FileCatalog,
    folders: FolderManager,
    quota: QuotaLedger,
    cache: PayloadCache,
    retry: RetryConfig,
    config: EngineConfig,
    /// Recent token -> (file_id, version_number) outcomes, bounded LRU.
    /// Process-local: replay protection covers retries within one engine
    /// lifetime and resets on restart.
    idempotency: Mutex<LruCache<String, (Uuid, u32)>>,
}

impl StorageEngine {
    pub fn new(store: Arc<dyn ObjectStore>, config: EngineConfig) -> Self {
        Self::with_access_control(store, Arc::new(NoSharing), config)
    }

    pub fn with_access_control(
        store: Arc<dyn ObjectStore>,
        access: Arc<dyn AccessControl>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            access,
            catalog: FileCatalog::new(),
            folders: FolderManager::new(),
            quota: QuotaLedger::new(config.default_quota_bytes),
            cache: PayloadCache::new(config.cache_capacity),
            retry: RetryConfig::new(
                config.retry_max_attempts,
                Duration::from_millis(config.retry_initial_delay_ms),
            ),
            idempotency: Mutex::new(LruCache::new(
                NonZeroUsize::new(config.idempotency_capacity.max(1)).unwrap(),
            )),
            config,
        }
    }

    // ---- access helpers ----

    async fn file_access(&self, file: &FileRecord, user_id: Uuid) -> AccessDecision {
        if file.owner_id == user_id {
            return AccessDecision::all();
        }
        let mut decision = self
            .access
            .check_access(ResourceKind::File, file.id, user_id)
            .await;
        if file.is_public {
            decision.can_read = true;
        }
        decision
    }

    async fn folder_access(&self, folder: &FolderRecord, user_id: Uuid) -> AccessDecision {
        if folder.owner_id == user_id {
            return AccessDecision::all();
        }
        let mut decision = self
            .access
            .check_access(ResourceKind::Folder, folder.id, user_id)
            .await;
        if folder.is_public {
            decision.can_read = true;
        }
        decision
    }

    async fn require_file_write(&self, file_id: Uuid, user_id: Uuid) -> Result<FileRecord> {
        let file = self.catalog.file(file_id).await?;
        if !self.file_access(&file, user_id).await.can_write {
            return Err(EngineError::AccessDenied);
        }
        Ok(file)
    }

    async fn require_file_read(&self, file_id: Uuid, user_id: Uuid) -> Result<FileRecord> {
        let file = self.catalog.file(file_id).await?;
        if !self.file_access(&file, user_id).await.can_read {
            return Err(EngineError::AccessDenied);
        }
        Ok(file)
    }

    // ---- crypto helpers ----

    fn should_encrypt(&self, override_flag: Option<bool>) -> bool {
        override_flag.unwrap_or(self.config.encrypt_at_rest)
    }

    fn passphrase(&self) -> Result<String> {
        self.config.master_passphrase.clone().ok_or_else(|| {
            EngineError::Validation("encryption enabled but no master passphrase configured".into())
        })
    }

    /// Key derivation is CPU-bound; keep it off the async workers.
    async fn seal_payload(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let passphrase = self.passphrase()?;
        task::spawn_blocking(move || crypto::seal(&data, &passphrase))
            .await
            .map_err(|e| EngineError::StorageUnavailable(format!("worker failed: {}", e)))?
    }

    async fn open_payload(&self, blob: Vec<u8>) -> Result<Vec<u8>> {
        let passphrase = self.passphrase()?;
        task::spawn_blocking(move || crypto::open(&blob, &passphrase))
            .await
            .map_err(|e| EngineError::StorageUnavailable(format!("worker failed: {}", e)))?
    }

    async fn put_object(&self, key: &str, payload: &[u8]) -> Result<()> {
        with_retry(&self.retry, || async move { self.store.put(key, payload).await }).await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        with_retry(&self.retry, || async move { self.store.get(key).await }).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        with_retry(&self.retry, || async move { self.store.delete(key).await }).await
    }

    /// Cleanup after a failure between quota reserve and commit: nothing may
    /// stay charged and no partial object may stay behind.
    async fn abort_upload(&self, owner_id: Uuid, size: u64, key: &str) {
        self.quota.release(owner_id, size).await;
        if let Err(e) = self.store.delete(key).await {
            warn!(key, error = %e, "failed to clean up partial object");
        }
    }

    async fn replay(&self, token: Option<&str>) -> Result<Option<(FileRecord, VersionRecord)>> {
        let Some(token) = token else { return Ok(None) };
        let committed = {
            let mut tokens = self.idempotency.lock().await;
            tokens.get(token).copied()
        };
        match committed {
            Some((file_id, number)) => {
                let file = self.catalog.file(file_id).await?;
                let version = self.catalog.version(file_id, number).await?;
                Ok(Some((file, version)))
            }
            None => Ok(None),
        }
    }

    async fn remember(&self, token: Option<String>, file_id: Uuid, number: u32) {
        if let Some(token) = token {
            self.idempotency.lock().await.put(token, (file_id, number));
        }
    }

    // ---- uploads & versions ----

    /// Admits, charges and stores a brand-new file with version 1.
    pub async fn upload(&self, request: UploadRequest) -> Result<(FileRecord, VersionRecord)> {
        if let Some(outcome) = self.replay(request.idempotency_token.as_deref()).await? {
            return Ok(outcome);
        }

        let report = validation::validate(
            &request.name,
            &request.mime_type,
            request.data.len() as u64,
            &request.data,
        );
        if !report.ok {
            let reason = report.reason.unwrap_or_else(|| "rejected".into());
            info!(name = %request.name, %reason, "upload rejected by validation");
            return Err(EngineError::Validation(reason));
        }

        if let Some(folder_id) = request.folder_id {
            let folder = self.folders.get(folder_id).await?;
            if !self.folder_access(&folder, request.owner_id).await.can_write {
                return Err(EngineError::AccessDenied);
            }
        }

        let size = request.data.len() as u64;
        let checksum = crypto::checksum(&request.data);
        let encrypted = self.should_encrypt(request.encrypt);

        self.quota.reserve(request.owner_id, size).await?;

        let file_id = Uuid::new_v4();
        let storage_key = format!("objects/{}/{}", file_id, Uuid::new_v4());

        let payload = if encrypted {
            match self.seal_payload(request.data).await {
                Ok(blob) => blob,
                Err(e) => {
                    self.quota.release(request.owner_id, size).await;
                    return Err(e);
                }
            }
        } else {
            request.data
        };

        if let Err(e) = self.put_object(&storage_key, &payload).await {
            self.abort_upload(request.owner_id, size, &storage_key).await;
            return Err(e);
        }

        let now = Utc::now();
        self.catalog
            .insert_file(FileRecord {
                id: file_id,
                name: request.name.clone(),
                original_name: request.name,
                description: request.description,
                mime_type: request.mime_type.clone(),
                owner_id: request.owner_id,
                folder_id: request.folder_id,
                is_public: false,
                state: FileState::Active,
                trashed_at: None,
                current_version: 0,
                created_at: now,
                updated_at: now,
            })
            .await;

        let version = match self
            .catalog
            .append_version(NewVersionInput {
                file_id,
                storage_key: storage_key.clone(),
                size,
                mime_type: request.mime_type,
                checksum,
                encrypted,
                uploaded_by: request.owner_id,
            })
            .await
        {
            Ok(version) => version,
            Err(e) => {
                self.abort_upload(request.owner_id, size, &storage_key).await;
                return Err(e);
            }
        };

        self.quota.commit(request.owner_id, size).await;
        self.remember(request.idempotency_token, file_id, version.version_number)
            .await;

        let file = self.catalog.file(file_id).await?;
        info!(%file_id, version = version.version_number, size, encrypted, "upload committed");
        Ok((file, version))
    }

    /// Appends a new immutable version. Full-history policy: the old bytes
    /// stay charged, the new size is charged on top.
    pub async fn new_version(
        &self,
        file_id: Uuid,
        uploader_id: Uuid,
        data: Vec<u8>,
        mime_type: &str,
        idempotency_token: Option<String>,
    ) -> Result<VersionRecord> {
        if let Some((_, version)) = self.replay(idempotency_token.as_deref()).await? {
            return Ok(version);
        }

        let file = self.require_file_write(file_id, uploader_id).await?;
        if file.is_trashed() {
            return Err(EngineError::Validation("file is in the trash".into()));
        }

        let report = validation::validate(&file.name, mime_type, data.len() as u64, &data);
        if !report.ok {
            return Err(EngineError::Validation(
                report.reason.unwrap_or_else(|| "rejected".into()),
            ));
        }

        let size = data.len() as u64;
        let checksum = crypto::checksum(&data);
        let encrypted = self.should_encrypt(None);

        self.quota.reserve(file.owner_id, size).await?;

        let storage_key = format!("objects/{}/{}", file_id, Uuid::new_v4());
        let payload = if encrypted {
            match self.seal_payload(data).await {
                Ok(blob) => blob,
                Err(e) => {
                    self.quota.release(file.owner_id, size).await;
                    return Err(e);
                }
            }
        } else {
            data
        };

        if let Err(e) = self.put_object(&storage_key, &payload).await {
            self.abort_upload(file.owner_id, size, &storage_key).await;
            return Err(e);
        }

        let version = match self
            .catalog
            .append_version(NewVersionInput {
                file_id,
                storage_key: storage_key.clone(),
                size,
                mime_type: mime_type.to_string(),
                checksum,
                encrypted,
                uploaded_by: uploader_id,
            })
            .await
        {
            Ok(version) => version,
            Err(e) => {
                self.abort_upload(file.owner_id, size, &storage_key).await;
                return Err(e);
            }
        };

        self.quota.commit(file.owner_id, size).await;
        self.remember(idempotency_token, file_id, version.version_number)
            .await;
        info!(%file_id, version = version.version_number, size, "new version committed");
        Ok(version)
    }

    pub async fn current_version(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Option<VersionRecord>> {
        self.require_file_read(file_id, requester_id).await?;
        self.catalog.current_version(file_id).await
    }

    /// All versions, newest first.
    pub async fn versions(&self, file_id: Uuid, requester_id: Uuid) -> Result<Vec<VersionRecord>> {
        self.require_file_read(file_id, requester_id).await?;
        self.catalog.versions(file_id).await
    }

    pub async fn version(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        number: u32,
    ) -> Result<VersionRecord> {
        self.require_file_read(file_id, requester_id).await?;
        self.catalog.version(file_id, number).await
    }

    // ---- reads ----

    /// Fetches and verifies a version's plaintext. A missing backing object
    /// behind intact metadata is storage drift and reported as not-found,
    /// never as empty output.
    pub async fn download(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        version_number: Option<u32>,
    ) -> Result<DownloadedFile> {
        let file = self.require_file_read(file_id, requester_id).await?;
        let version = match version_number {
            Some(n) => self.catalog.version(file_id, n).await?,
            None => self
                .catalog
                .current_version(file_id)
                .await?
                .ok_or_else(|| EngineError::not_found(NotFoundKind::Version, file_id))?,
        };

        if let Some(data) = self.cache.get(&version.id).await {
            return Ok(DownloadedFile { file, version, data });
        }

        let raw = self.get_object(&version.storage_key).await.map_err(|e| match e {
            EngineError::NotFound { .. } => {
                error!(%file_id, key = %version.storage_key, "backing object missing (storage drift)");
                EngineError::not_found(NotFoundKind::BackingObject, &version.storage_key)
            }
            other => other,
        })?;

        let data = if version.encrypted {
            self.open_payload(raw).await?
        } else {
            raw
        };

        if !crypto::verify_integrity(&data, &version.checksum) {
            error!(%file_id, version = version.version_number, "checksum mismatch on read");
            return Err(EngineError::Integrity("checksum mismatch on read".into()));
        }

        self.cache.put(version.id, data.clone()).await;
        Ok(DownloadedFile { file, version, data })
    }

    /// Time-limited capability URL for direct download of a plaintext
    /// object. Encrypted versions must stream through `download`.
    pub async fn download_url(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        version_number: Option<u32>,
    ) -> Result<String> {
        self.require_file_read(file_id, requester_id).await?;
        let version = match version_number {
            Some(n) => self.catalog.version(file_id, n).await?,
            None => self
                .catalog
                .current_version(file_id)
                .await?
                .ok_or_else(|| EngineError::not_found(NotFoundKind::Version, file_id))?,
        };
        if version.encrypted {
            return Err(EngineError::Validation(
                "encrypted versions cannot be served by signed URL".into(),
            ));
        }
        if !self.store.exists(&version.storage_key).await? {
            error!(%file_id, key = %version.storage_key, "backing object missing (storage drift)");
            return Err(EngineError::not_found(
                NotFoundKind::BackingObject,
                &version.storage_key,
            ));
        }
        self.store
            .signed_url(
                &version.storage_key,
                Duration::from_secs(self.config.signed_url_ttl_secs),
                SignedUrlMode::Read,
            )
            .await
    }

    // ---- lifecycle ----

    /// Moves a file to the trash. Idempotent: trashing a trashed file is a
    /// no-op.
    pub async fn soft_delete(&self, file_id: Uuid, requester_id: Uuid) -> Result<FileRecord> {
        let file = self.require_file_write(file_id, requester_id).await?;
        if file.is_trashed() {
            return Ok(file);
        }
        self.catalog
            .update_file(file_id, |f| {
                f.state = FileState::Trashed;
                f.trashed_at = Some(Utc::now());
            })
            .await
    }

    /// Idempotent: restoring an active file is a no-op.
    pub async fn restore(&self, file_id: Uuid, requester_id: Uuid) -> Result<FileRecord> {
        let file = self.require_file_write(file_id, requester_id).await?;
        if !file.is_trashed() {
            return Ok(file);
        }
        self.catalog
            .update_file(file_id, |f| {
                f.state = FileState::Active;
                f.trashed_at = None;
            })
            .await
    }

    /// Irreversibly removes a file: every version's backing object first,
    /// then the metadata, then the quota charge for the full history. A
    /// crash mid-way leaves recoverable orphaned objects, never metadata
    /// pointing at nothing.
    pub async fn hard_delete(&self, file_id: Uuid, requester_id: Uuid) -> Result<()> {
        let file = self.require_file_write(file_id, requester_id).await?;
        self.hard_delete_record(&file).await
    }

    async fn hard_delete_record(&self, file: &FileRecord) -> Result<()> {
        let file_id = file.id;
        let versions = self.catalog.versions(file_id).await?;

        for version in &versions {
            self.delete_object(&version.storage_key).await?;
        }

        let (_, removed) = self.catalog.remove_file(file_id).await?;
        let total: u64 = removed.iter().map(|v| v.size).sum();
        self.quota.adjust_delta(file.owner_id, -(total as i64)).await?;

        for version in &removed {
            self.cache.invalidate(&version.id).await;
        }
        info!(%file_id, versions = removed.len(), bytes = total, "hard delete complete");
        Ok(())
    }

    pub async fn move_file(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        new_folder_id: Option<Uuid>,
    ) -> Result<FileRecord> {
        let file = self.require_file_write(file_id, requester_id).await?;
        if let Some(folder_id) = new_folder_id {
            let folder = self.folders.get(folder_id).await?;
            if folder.owner_id != file.owner_id {
                return Err(EngineError::AccessDenied);
            }
            if !self.folder_access(&folder, requester_id).await.can_write {
                return Err(EngineError::AccessDenied);
            }
        }
        self.catalog
            .update_file(file_id, |f| f.folder_id = new_folder_id)
            .await
    }

    /// Copies the current version's stored blob into a brand-new file owned
    /// by the requester. A copy is a fresh upload for quota purposes.
    pub async fn copy_file(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        dest_folder_id: Option<Uuid>,
        new_name: Option<String>,
    ) -> Result<(FileRecord, VersionRecord)> {
        let source = self.require_file_read(file_id, requester_id).await?;
        let version = self
            .catalog
            .current_version(file_id)
            .await?
            .ok_or_else(|| EngineError::not_found(NotFoundKind::Version, file_id))?;

        if let Some(folder_id) = dest_folder_id {
            let folder = self.folders.get(folder_id).await?;
            if !self.folder_access(&folder, requester_id).await.can_write {
                return Err(EngineError::AccessDenied);
            }
        }

        self.quota.reserve(requester_id, version.size).await?;

        // The stored blob is copied as-is; an encrypted source stays
        // encrypted under the same server-held key.
        let raw = match self.get_object(&version.storage_key).await {
            Ok(raw) => raw,
            Err(e) => {
                self.quota.release(requester_id, version.size).await;
                return Err(e);
            }
        };

        let new_file_id = Uuid::new_v4();
        let storage_key = format!("objects/{}/{}", new_file_id, Uuid::new_v4());
        if let Err(e) = self.put_object(&storage_key, &raw).await {
            self.abort_upload(requester_id, version.size, &storage_key).await;
            return Err(e);
        }

        let now = Utc::now();
        let name = new_name.unwrap_or_else(|| source.name.clone());
        self.catalog
            .insert_file(FileRecord {
                id: new_file_id,
                name: name.clone(),
                original_name: name,
                description: source.description.clone(),
                mime_type: source.mime_type.clone(),
                owner_id: requester_id,
                folder_id: dest_folder_id,
                is_public: false,
                state: FileState::Active,
                trashed_at: None,
                current_version: 0,
                created_at: now,
                updated_at: now,
            })
            .await;

        let new_version = match self
            .catalog
            .append_version(NewVersionInput {
                file_id: new_file_id,
                storage_key: storage_key.clone(),
                size: version.size,
                mime_type: version.mime_type.clone(),
                checksum: version.checksum.clone(),
                encrypted: version.encrypted,
                uploaded_by: requester_id,
            })
            .await
        {
            Ok(v) => v,
            Err(e) => {
                self.abort_upload(requester_id, version.size, &storage_key).await;
                return Err(e);
            }
        };

        self.quota.commit(requester_id, version.size).await;
        let file = self.catalog.file(new_file_id).await?;
        Ok((file, new_version))
    }

    /// Best-effort batch: each item is independent and a failure never
    /// aborts the rest.
    pub async fn bulk(
        &self,
        requester_id: Uuid,
        file_ids: Vec<Uuid>,
        op: BulkOp,
    ) -> Vec<BulkItemOutcome> {
        let mut outcomes = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            let result = match &op {
                BulkOp::Move { folder_id } => self
                    .move_file(file_id, requester_id, *folder_id)
                    .await
                    .map(|_| ()),
                BulkOp::SoftDelete => self.soft_delete(file_id, requester_id).await.map(|_| ()),
                BulkOp::Restore => self.restore(file_id, requester_id).await.map(|_| ()),
                BulkOp::HardDelete => self.hard_delete(file_id, requester_id).await,
                BulkOp::Tag { key, value } => {
                    self.set_metadata(file_id, requester_id, key, value).await
                }
            };
            outcomes.push(BulkItemOutcome { file_id, result });
        }
        outcomes
    }

    // ---- file metadata ----

    pub async fn rename_file(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        name: &str,
    ) -> Result<FileRecord> {
        self.require_file_write(file_id, requester_id).await?;
        if let Some(reason) = validation::validate(name, "", 0, &[]).reason {
            return Err(EngineError::Validation(reason));
        }
        let name = name.to_string();
        self.catalog.update_file(file_id, |f| f.name = name).await
    }

    pub async fn set_description(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        description: Option<String>,
    ) -> Result<FileRecord> {
        self.require_file_write(file_id, requester_id).await?;
        self.catalog
            .update_file(file_id, |f| f.description = description)
            .await
    }

    /// Publishing or unpublishing needs the admin capability, not just
    /// write: a write grant lets a collaborator edit the file, not widen
    /// who can see it. Owners hold admin implicitly.
    pub async fn set_visibility(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        is_public: bool,
    ) -> Result<FileRecord> {
        let file = self.catalog.file(file_id).await?;
        if !self.file_access(&file, requester_id).await.can_admin {
            return Err(EngineError::AccessDenied);
        }
        self.catalog
            .update_file(file_id, |f| f.is_public = is_public)
            .await
    }

    pub async fn set_metadata(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.require_file_write(file_id, requester_id).await?;
        self.catalog.set_metadata(file_id, key, value).await
    }

    pub async fn metadata(
        &self,
        file_id: Uuid,
        requester_id: Uuid,
    ) -> Result<HashMap<String, String>> {
        self.require_file_read(file_id, requester_id).await?;
        self.catalog.metadata(file_id).await
    }

    pub async fn file(&self, file_id: Uuid, requester_id: Uuid) -> Result<FileRecord> {
        self.require_file_read(file_id, requester_id).await
    }

    pub async fn list_files(&self, owner_id: Uuid, include_trashed: bool) -> Vec<FileRecord> {
        self.catalog.files_by_owner(owner_id, include_trashed).await
    }

    // ---- folders ----

    /// Creates a folder. Under a parent the caller needs write access on it,
    /// and the new folder joins the parent owner's tree (trees never span
    /// owners).
    pub async fn create_folder(
        &self,
        requester_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> Result<FolderRecord> {
        let owner_id = match parent_id {
            Some(parent) => {
                let folder = self.folders.get(parent).await?;
                if !self.folder_access(&folder, requester_id).await.can_write {
                    return Err(EngineError::AccessDenied);
                }
                folder.owner_id
            }
            None => requester_id,
        };
        self.folders.create(owner_id, name, parent_id).await
    }

    pub async fn move_folder(
        &self,
        folder_id: Uuid,
        requester_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> Result<FolderRecord> {
        let folder = self.folders.get(folder_id).await?;
        if !self.folder_access(&folder, requester_id).await.can_write {
            return Err(EngineError::AccessDenied);
        }
        self.folders.move_folder(folder_id, new_parent_id).await
    }

    pub async fn rename_folder(
        &self,
        folder_id: Uuid,
        requester_id: Uuid,
        name: &str,
    ) -> Result<FolderRecord> {
        let folder = self.folders.get(folder_id).await?;
        if !self.folder_access(&folder, requester_id).await.can_write {
            return Err(EngineError::AccessDenied);
        }
        self.folders.rename(folder_id, name).await
    }

    /// Breadcrumb from the root to the folder.
    pub async fn folder_path(&self, folder_id: Uuid) -> Result<Vec<FolderRecord>> {
        self.folders.path(folder_id).await
    }

    /// A user's whole folder forest, parents before children.
    pub async fn folder_tree(&self, owner_id: Uuid) -> Vec<FolderRecord> {
        self.folders.tree(owner_id).await
    }

    /// Folders and files directly under `folder_id` (or the root). A folder
    /// listing shows everything placed in it, including files a grantee
    /// owns; the root is the caller's own.
    pub async fn list_folder(
        &self,
        owner_id: Uuid,
        folder_id: Option<Uuid>,
    ) -> (Vec<FolderRecord>, Vec<FileRecord>) {
        let folders = self.folders.children(owner_id, folder_id).await;
        let files = match folder_id {
            Some(id) => self.catalog.files_in_folder(id).await,
            None => self.catalog.root_files(owner_id).await,
        };
        (folders, files)
    }

    /// Deletes a folder. Without `cascade` the folder must be empty. With
    /// `cascade`, deletion is depth-first and files are hard-deleted (quota
    /// released) before their folders, so a crash mid-cascade never leaves
    /// quota referencing deleted bytes.
    pub async fn delete_folder(
        &self,
        folder_id: Uuid,
        requester_id: Uuid,
        cascade: bool,
    ) -> Result<()> {
        let folder = self.folders.get(folder_id).await?;
        if !self.folder_access(&folder, requester_id).await.can_write {
            return Err(EngineError::AccessDenied);
        }

        if !cascade {
            let has_files = !self.catalog.files_in_folder(folder_id).await.is_empty();
            if has_files || self.folders.has_children(folder_id).await {
                return Err(EngineError::Validation(
                    "folder is not empty; request a cascading delete".into(),
                ));
            }
            return self.folders.remove(folder_id).await;
        }

        // Pre-order subtree reversed: every child precedes its parent.
        // Write access on the folder covers everything placed inside it,
        // files owned by grantees included, so the per-file check is not
        // repeated here.
        let nodes = self.folders.subtree(folder_id).await?;
        for node in nodes.iter().rev() {
            for file in self.catalog.files_in_folder(node.id).await {
                self.hard_delete_record(&file).await?;
            }
            self.folders.remove(node.id).await?;
            info!(folder = %node.id, "cascade removed folder");
        }
        Ok(())
    }

    // ---- state persistence ----

    /// Snapshots the metadata tables through the same object-store adapter
    /// the payloads go through, so the engine survives a restart on any
    /// backend.
    pub async fn persist_state(&self) -> Result<()> {
        let (files, versions, metadata) = self.catalog.export().await;
        let snapshot = EngineSnapshot {
            files,
            versions,
            metadata,
            folders: self.folders.export().await,
            quotas: self.quota.export().await,
        };
        let encoded = serde_json::to_vec(&snapshot)
            .map_err(|e| EngineError::StorageUnavailable(format!("snapshot encode: {}", e)))?;
        self.put_object(STATE_KEY, &encoded).await
    }

    /// Restores a snapshot written by `persist_state`. A missing snapshot is
    /// a fresh deployment, not an error.
    pub async fn load_state(&self) -> Result<()> {
        if !self.store.exists(STATE_KEY).await? {
            return Ok(());
        }
        let raw = self.get_object(STATE_KEY).await?;
        let snapshot: EngineSnapshot = serde_json::from_slice(&raw)
            .map_err(|e| EngineError::Integrity(format!("snapshot decode: {}", e)))?;
        self.catalog
            .import(snapshot.files, snapshot.versions, snapshot.metadata)
            .await;
        self.folders.import(snapshot.folders).await;
        self.quota.import(snapshot.quotas).await;
        Ok(())
    }

    // ---- quota ----

    /// Committed usage and ceiling for a user.
    pub async fn usage(&self, user_id: Uuid) -> (u64, u64) {
        self.quota.usage(user_id).await
    }

    pub async fn set_quota(&self, user_id: Uuid, total_bytes: u64) {
        self.quota.set_total(user_id, total_bytes).await;
    }
}
