//! Access-control collaborator seam. The engine already grants owners full
//! capability and public files read capability; this trait covers sharing
//! grants issued by an external system.

use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Folder,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessDecision {
    pub can_read: bool,
    pub can_write: bool,
    pub can_admin: bool,
}

impl AccessDecision {
    pub fn all() -> Self {
        Self {
            can_read: true,
            can_write: true,
            can_admin: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn check_access(
        &self,
        resource: ResourceKind,
        resource_id: Uuid,
        user_id: Uuid,
    ) -> AccessDecision;
}

/// Default collaborator: no sharing grants at all. Ownership and public
/// visibility, handled in the engine, are then the only access paths.
pub struct NoSharing;

#[async_trait]
impl AccessControl for NoSharing {
    async fn check_access(
        &self,
        _resource: ResourceKind,
        _resource_id: Uuid,
        _user_id: Uuid,
    ) -> AccessDecision {
        AccessDecision::none()
    }
}
