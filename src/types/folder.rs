use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Node in a user's folder tree. The parent chain is always finite and
/// acyclic; the hierarchy manager enforces that on every move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Immutable after creation; folders never change owner.
    pub owner_id: Uuid,
    /// None means the folder sits at the owner's root.
    pub parent_id: Option<Uuid>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
