//! Metadata store for files, versions and the per-file key/value map. One
//! `RwLock` over the whole catalog stands in for the backing database; the
//! `(file_id, version_number)` and `(file_id, key)` uniqueness constraints
//! are enforced here, and version numbers are assigned inside the write
//! lock so concurrent inserts can neither collide nor leave gaps.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, NotFoundKind, Result};
use crate::types::{FileRecord, FileState, VersionRecord};

#[derive(Default)]
struct CatalogState {
    files: HashMap<Uuid, FileRecord>,
    /// Versions per file, ascending by version number.
    versions: HashMap<Uuid, Vec<VersionRecord>>,
    metadata: HashMap<Uuid, HashMap<String, String>>,
}

pub struct FileCatalog {
    state: RwLock<CatalogState>,
}

/// Everything the engine needs to hand a version's number out before the
/// object write happens without racing another inserter.
pub struct NewVersionInput {
    pub file_id: Uuid,
    pub storage_key: String,
    pub size: u64,
    pub mime_type: String,
    pub checksum: String,
    pub encrypted: bool,
    pub uploaded_by: Uuid,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub async fn insert_file(&self, record: FileRecord) {
        let mut state = self.state.write().await;
        state.files.insert(record.id, record);
    }

    pub async fn file(&self, file_id: Uuid) -> Result<FileRecord> {
        let state = self.state.read().await;
        state
            .files
            .get(&file_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(NotFoundKind::File, file_id))
    }

    pub async fn update_file<F>(&self, file_id: Uuid, mutate: F) -> Result<FileRecord>
    where
        F: FnOnce(&mut FileRecord),
    {
        let mut state = self.state.write().await;
        let record = state
            .files
            .get_mut(&file_id)
            .ok_or_else(|| EngineError::not_found(NotFoundKind::File, file_id))?;
        mutate(record);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Appends a version, assigning `current_version + 1` under the write
    /// lock. Returns the committed record.
    pub async fn append_version(&self, input: NewVersionInput) -> Result<VersionRecord> {
        let mut state = self.state.write().await;
        let file = state
            .files
            .get_mut(&input.file_id)
            .ok_or_else(|| EngineError::not_found(NotFoundKind::File, input.file_id))?;

        let number = file.current_version + 1;
        file.current_version = number;
        file.mime_type = input.mime_type.clone();
        file.updated_at = Utc::now();

        let record = VersionRecord {
            id: Uuid::new_v4(),
            file_id: input.file_id,
            version_number: number,
            storage_key: input.storage_key,
            size: input.size,
            mime_type: input.mime_type,
            checksum: input.checksum,
            encrypted: input.encrypted,
            uploaded_by: input.uploaded_by,
            created_at: Utc::now(),
        };

        let versions = state.versions.entry(input.file_id).or_default();
        debug_assert!(versions.iter().all(|v| v.version_number != number));
        versions.push(record.clone());
        Ok(record)
    }

    /// All versions of a file, newest first.
    pub async fn versions(&self, file_id: Uuid) -> Result<Vec<VersionRecord>> {
        let state = self.state.read().await;
        if !state.files.contains_key(&file_id) {
            return Err(EngineError::not_found(NotFoundKind::File, file_id));
        }
        let mut out = state.versions.get(&file_id).cloned().unwrap_or_default();
        out.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(out)
    }

    pub async fn version(&self, file_id: Uuid, number: u32) -> Result<VersionRecord> {
        let state = self.state.read().await;
        state
            .versions
            .get(&file_id)
            .and_then(|v| v.iter().find(|r| r.version_number == number))
            .cloned()
            .ok_or_else(|| {
                EngineError::not_found(NotFoundKind::Version, format!("{}#{}", file_id, number))
            })
    }

    pub async fn current_version(&self, file_id: Uuid) -> Result<Option<VersionRecord>> {
        let state = self.state.read().await;
        if !state.files.contains_key(&file_id) {
            return Err(EngineError::not_found(NotFoundKind::File, file_id));
        }
        Ok(state
            .versions
            .get(&file_id)
            .and_then(|v| v.iter().max_by_key(|r| r.version_number))
            .cloned())
    }

    /// Removes the file row, its versions and its metadata, returning the
    /// removed versions so the caller can settle quota. Call only after the
    /// backing objects are confirmed gone.
    pub async fn remove_file(&self, file_id: Uuid) -> Result<(FileRecord, Vec<VersionRecord>)> {
        let mut state = self.state.write().await;
        let file = state
            .files
            .remove(&file_id)
            .ok_or_else(|| EngineError::not_found(NotFoundKind::File, file_id))?;
        let versions = state.versions.remove(&file_id).unwrap_or_default();
        state.metadata.remove(&file_id);
        Ok((file, versions))
    }

    /// Every file placed in the folder, whoever owns it. A write grant lets
    /// users park files they own inside someone else's folder, so emptiness
    /// checks and listings must key on the folder alone.
    pub async fn files_in_folder(&self, folder_id: Uuid) -> Vec<FileRecord> {
        let state = self.state.read().await;
        let mut out: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.folder_id == Some(folder_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// A user's files outside any folder. The root is per-user, not a shared
    /// container, so it stays owner-keyed.
    pub async fn root_files(&self, owner_id: Uuid) -> Vec<FileRecord> {
        let state = self.state.read().await;
        let mut out: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.owner_id == owner_id && f.folder_id.is_none())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn files_by_owner(&self, owner_id: Uuid, include_trashed: bool) -> Vec<FileRecord> {
        let state = self.state.read().await;
        let mut out: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .filter(|f| include_trashed || f.state == FileState::Active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Upsert on the unique `(file_id, key)` pair.
    pub async fn set_metadata(&self, file_id: Uuid, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.files.contains_key(&file_id) {
            return Err(EngineError::not_found(NotFoundKind::File, file_id));
        }
        state
            .metadata
            .entry(file_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub async fn metadata(&self, file_id: Uuid) -> Result<HashMap<String, String>> {
        let state = self.state.read().await;
        if !state.files.contains_key(&file_id) {
            return Err(EngineError::not_found(NotFoundKind::File, file_id));
        }
        Ok(state.metadata.get(&file_id).cloned().unwrap_or_default())
    }

    /// Flat dump of all tables for snapshot persistence.
    pub async fn export(&self) -> (Vec<FileRecord>, Vec<VersionRecord>, Vec<(Uuid, String, String)>) {
        let state = self.state.read().await;
        let files = state.files.values().cloned().collect();
        let versions = state.versions.values().flatten().cloned().collect();
        let metadata = state
            .metadata
            .iter()
            .flat_map(|(file_id, map)| {
                map.iter()
                    .map(move |(k, v)| (*file_id, k.clone(), v.clone()))
            })
            .collect();
        (files, versions, metadata)
    }

    /// Replaces the catalog contents with a previously exported snapshot.
    pub async fn import(
        &self,
        files: Vec<FileRecord>,
        versions: Vec<VersionRecord>,
        metadata: Vec<(Uuid, String, String)>,
    ) {
        let mut state = self.state.write().await;
        state.files = files.into_iter().map(|f| (f.id, f)).collect();
        state.versions.clear();
        for version in versions {
            state.versions.entry(version.file_id).or_default().push(version);
        }
        for list in state.versions.values_mut() {
            list.sort_by_key(|v| v.version_number);
        }
        state.metadata.clear();
        for (file_id, key, value) in metadata {
            state.metadata.entry(file_id).or_default().insert(key, value);
        }
    }

    pub async fn metadata_value(&self, file_id: Uuid, key: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        if !state.files.contains_key(&file_id) {
            return Err(EngineError::not_found(NotFoundKind::File, file_id));
        }
        Ok(state
            .metadata
            .get(&file_id)
            .and_then(|m| m.get(key))
            .cloned())
    }
}

impl Default for FileCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_file(owner: Uuid) -> FileRecord {
        let now = Utc::now();
        FileRecord {
            id: Uuid::new_v4(),
            name: "sample.txt".into(),
            original_name: "sample.txt".into(),
            description: None,
            mime_type: "text/plain".into(),
            owner_id: owner,
            folder_id: None,
            is_public: false,
            state: FileState::Active,
            trashed_at: None,
            current_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn version_input(file_id: Uuid, uploader: Uuid) -> NewVersionInput {
        NewVersionInput {
            file_id,
            storage_key: format!("objects/{}/{}", file_id, Uuid::new_v4()),
            size: 10,
            mime_type: "text/plain".into(),
            checksum: "00".into(),
            encrypted: false,
            uploaded_by: uploader,
        }
    }

    #[tokio::test]
    async fn version_numbers_are_dense_and_newest_first() {
        let catalog = FileCatalog::new();
        let owner = Uuid::new_v4();
        let file = sample_file(owner);
        let file_id = file.id;
        catalog.insert_file(file).await;

        for _ in 0..4 {
            catalog
                .append_version(version_input(file_id, owner))
                .await
                .expect("append");
        }
        let versions = catalog.versions(file_id).await.expect("versions");
        let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn concurrent_appends_get_distinct_numbers() {
        let catalog = Arc::new(FileCatalog::new());
        let owner = Uuid::new_v4();
        let file = sample_file(owner);
        let file_id = file.id;
        catalog.insert_file(file).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let catalog = Arc::clone(&catalog);
            handles.push(tokio::spawn(async move {
                catalog.append_version(version_input(file_id, owner)).await
            }));
        }
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.expect("join").expect("append").version_number);
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=8).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn folder_listing_is_keyed_by_folder_not_owner() {
        let catalog = FileCatalog::new();
        let owner = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let folder_id = Uuid::new_v4();

        let mut mine = sample_file(owner);
        mine.folder_id = Some(folder_id);
        let mut theirs = sample_file(guest);
        theirs.folder_id = Some(folder_id);
        catalog.insert_file(mine).await;
        catalog.insert_file(theirs).await;
        catalog.insert_file(sample_file(owner)).await;

        let in_folder = catalog.files_in_folder(folder_id).await;
        assert_eq!(in_folder.len(), 2);

        let at_root = catalog.root_files(owner).await;
        assert_eq!(at_root.len(), 1);
        assert_eq!(at_root[0].owner_id, owner);
    }

    #[tokio::test]
    async fn metadata_upserts() {
        let catalog = FileCatalog::new();
        let owner = Uuid::new_v4();
        let file = sample_file(owner);
        let file_id = file.id;
        catalog.insert_file(file).await;

        catalog.set_metadata(file_id, "tag", "alpha").await.expect("set");
        catalog.set_metadata(file_id, "tag", "beta").await.expect("upsert");
        assert_eq!(
            catalog.metadata_value(file_id, "tag").await.expect("get"),
            Some("beta".into())
        );
        assert_eq!(catalog.metadata(file_id).await.expect("all").len(), 1);
    }
}
