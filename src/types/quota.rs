use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user storage accounting. `reserved_bytes` tracks in-flight uploads
/// between reserve and commit and is never reported as committed usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub user_id: Uuid,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub reserved_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn new(user_id: Uuid, total_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            total_bytes,
            used_bytes: 0,
            reserved_bytes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available(&self) -> u64 {
        self.total_bytes
            .saturating_sub(self.used_bytes)
            .saturating_sub(self.reserved_bytes)
    }
}
