use thiserror::Error;

/// What kind of thing was missing when a lookup failed. Metadata absence and
/// backing-object absence surface through the same variant but must stay
/// distinguishable for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    File,
    Folder,
    Version,
    /// Metadata row exists but the object store has no bytes for its key
    /// (storage drift).
    BackingObject,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFoundKind::File => write!(f, "file"),
            NotFoundKind::Folder => write!(f, "folder"),
            NotFoundKind::Version => write!(f, "version"),
            NotFoundKind::BackingObject => write!(f, "backing object"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("access denied")]
    AccessDenied,
    #[error("{kind} not found: {id}")]
    NotFound { kind: NotFoundKind, id: String },
    #[error("quota exceeded: requested {requested} bytes, {available} available")]
    QuotaExceeded { requested: u64, available: u64 },
    #[error("folder move would create a cycle")]
    CircularReference,
    #[error("integrity failure: {0}")]
    Integrity(String),
    #[error("object store unavailable: {0}")]
    StorageUnavailable(String),
    #[error("concurrent modification, retry the operation")]
    ConcurrentModification,
}

impl EngineError {
    pub fn not_found(kind: NotFoundKind, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Only storage outages and lost races are worth retrying; everything
    /// else is deterministic and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StorageUnavailable(_) | EngineError::ConcurrentModification
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
