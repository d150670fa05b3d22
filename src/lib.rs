pub mod access;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod folder;
pub mod quota;
pub mod retry;
pub mod store;
pub mod validation;

mod types;

pub use config::EngineConfig;
pub use engine::{BulkItemOutcome, BulkOp, DownloadedFile, StorageEngine, UploadRequest};
pub use error::{EngineError, NotFoundKind, Result};
pub use types::*;
