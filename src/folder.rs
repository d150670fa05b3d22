//! Folder hierarchy: a forest of per-owner trees. The breadcrumb walk and
//! the cycle check on move share one ancestor-chain implementation, and the
//! cycle check runs under the same write lock that performs the reparent, so
//! it always validates against committed state.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, NotFoundKind, Result};
use crate::types::FolderRecord;

pub struct FolderManager {
    folders: RwLock<HashMap<Uuid, FolderRecord>>,
}

/// Walks parent links from `start` to the root, collecting ids leaf-first.
/// A repeated id means the map is corrupt; the walk stops rather than spin.
fn ancestor_chain(folders: &HashMap<Uuid, FolderRecord>, start: Uuid) -> Vec<Uuid> {
    let mut chain = Vec::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        if chain.contains(&id) {
            break;
        }
        chain.push(id);
        cursor = folders.get(&id).and_then(|f| f.parent_id);
    }
    chain
}

impl FolderManager {
    pub fn new() -> Self {
        Self {
            folders: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(
        &self,
        owner_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> Result<FolderRecord> {
        let mut folders = self.folders.write().await;
        if let Some(parent) = parent_id {
            let parent_record = folders
                .get(&parent)
                .ok_or_else(|| EngineError::not_found(NotFoundKind::Folder, parent))?;
            // No cross-owner nesting in this design.
            if parent_record.owner_id != owner_id {
                return Err(EngineError::AccessDenied);
            }
        }
        let now = Utc::now();
        let record = FolderRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            owner_id,
            parent_id,
            is_public: false,
            created_at: now,
            updated_at: now,
        };
        folders.insert(record.id, record.clone());
        Ok(record)
    }

    pub async fn get(&self, folder_id: Uuid) -> Result<FolderRecord> {
        let folders = self.folders.read().await;
        folders
            .get(&folder_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(NotFoundKind::Folder, folder_id))
    }

    pub async fn rename(&self, folder_id: Uuid, name: &str) -> Result<FolderRecord> {
        let mut folders = self.folders.write().await;
        let record = folders
            .get_mut(&folder_id)
            .ok_or_else(|| EngineError::not_found(NotFoundKind::Folder, folder_id))?;
        record.name = name.to_string();
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Reparents a folder. Rejected with `CircularReference` when the new
    /// parent is the folder itself or any of its descendants; nothing is
    /// persisted on rejection.
    pub async fn move_folder(
        &self,
        folder_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> Result<FolderRecord> {
        let mut folders = self.folders.write().await;
        let owner_id = folders
            .get(&folder_id)
            .ok_or_else(|| EngineError::not_found(NotFoundKind::Folder, folder_id))?
            .owner_id;

        if let Some(new_parent) = new_parent_id {
            let parent_record = folders
                .get(&new_parent)
                .ok_or_else(|| EngineError::not_found(NotFoundKind::Folder, new_parent))?;
            if parent_record.owner_id != owner_id {
                return Err(EngineError::AccessDenied);
            }
            if ancestor_chain(&folders, new_parent).contains(&folder_id) {
                return Err(EngineError::CircularReference);
            }
        }

        let record = folders.get_mut(&folder_id).ok_or_else(|| {
            EngineError::not_found(NotFoundKind::Folder, folder_id)
        })?;
        record.parent_id = new_parent_id;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Breadcrumb from the root down to `folder_id` inclusive.
    pub async fn path(&self, folder_id: Uuid) -> Result<Vec<FolderRecord>> {
        let folders = self.folders.read().await;
        if !folders.contains_key(&folder_id) {
            return Err(EngineError::not_found(NotFoundKind::Folder, folder_id));
        }
        let mut crumbs: Vec<FolderRecord> = ancestor_chain(&folders, folder_id)
            .into_iter()
            .filter_map(|id| folders.get(&id).cloned())
            .collect();
        crumbs.reverse();
        Ok(crumbs)
    }

    pub async fn children(&self, owner_id: Uuid, parent_id: Option<Uuid>) -> Vec<FolderRecord> {
        let folders = self.folders.read().await;
        let mut out: Vec<FolderRecord> = folders
            .values()
            .filter(|f| f.owner_id == owner_id && f.parent_id == parent_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// All folders under `root_id` (inclusive), parents before children.
    /// Iterative work-list walk; depth never touches the call stack.
    pub async fn subtree(&self, root_id: Uuid) -> Result<Vec<FolderRecord>> {
        let folders = self.folders.read().await;
        if !folders.contains_key(&root_id) {
            return Err(EngineError::not_found(NotFoundKind::Folder, root_id));
        }
        let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for folder in folders.values() {
            if let Some(parent) = folder.parent_id {
                children_of.entry(parent).or_default().push(folder.id);
            }
        }

        let mut out = Vec::new();
        let mut work = vec![root_id];
        while let Some(id) = work.pop() {
            if let Some(record) = folders.get(&id) {
                out.push(record.clone());
            }
            if let Some(kids) = children_of.get(&id) {
                work.extend(kids.iter().copied());
            }
        }
        Ok(out)
    }

    /// A user's whole forest, parents before children.
    pub async fn tree(&self, owner_id: Uuid) -> Vec<FolderRecord> {
        let folders = self.folders.read().await;
        let mut children_of: HashMap<Option<Uuid>, Vec<Uuid>> = HashMap::new();
        for folder in folders.values().filter(|f| f.owner_id == owner_id) {
            children_of.entry(folder.parent_id).or_default().push(folder.id);
        }
        let mut out = Vec::new();
        let mut work: Vec<Uuid> = children_of.get(&None).cloned().unwrap_or_default();
        while let Some(id) = work.pop() {
            if let Some(record) = folders.get(&id) {
                out.push(record.clone());
            }
            if let Some(kids) = children_of.get(&Some(id)) {
                work.extend(kids.iter().copied());
            }
        }
        out
    }

    pub async fn has_children(&self, folder_id: Uuid) -> bool {
        let folders = self.folders.read().await;
        folders.values().any(|f| f.parent_id == Some(folder_id))
    }

    pub async fn export(&self) -> Vec<FolderRecord> {
        let folders = self.folders.read().await;
        folders.values().cloned().collect()
    }

    pub async fn import(&self, records: Vec<FolderRecord>) {
        let mut folders = self.folders.write().await;
        *folders = records.into_iter().map(|f| (f.id, f)).collect();
    }

    /// Removes the folder record only. Emptiness and cascade policy are the
    /// engine's responsibility.
    pub async fn remove(&self, folder_id: Uuid) -> Result<()> {
        let mut folders = self.folders.write().await;
        folders
            .remove(&folder_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(NotFoundKind::Folder, folder_id))
    }
}

impl Default for FolderManager {
    fn default() -> Self {
        Self::new()
    }
}
