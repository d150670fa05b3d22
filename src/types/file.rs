use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a file. Hard delete removes the record entirely, so it
/// has no representation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Active,
    Trashed,
}

/// Logical file handle. The bytes live in versions; this row only carries
/// naming, placement and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub original_name: String,
    pub description: Option<String>,
    pub mime_type: String,
    pub owner_id: Uuid,
    /// None means the file sits at the owner's root.
    pub folder_id: Option<Uuid>,
    pub is_public: bool,
    pub state: FileState,
    pub trashed_at: Option<DateTime<Utc>>,
    /// Highest committed version number; 0 only transiently during creation.
    pub current_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_trashed(&self) -> bool {
        self.state == FileState::Trashed
    }
}

/// One immutable snapshot of a file's bytes. Never mutated after insert;
/// removed only when its file is hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: Uuid,
    pub file_id: Uuid,
    /// Monotonically increasing from 1, no gaps, no duplicates per file.
    pub version_number: u32,
    pub storage_key: String,
    pub size: u64,
    pub mime_type: String,
    /// Hex SHA-256 of the plaintext.
    pub checksum: String,
    pub encrypted: bool,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}
