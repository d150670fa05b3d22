mod category;
mod file;
mod folder;
mod quota;

pub use category::{sniff_mime, FileCategory};
pub use file::{FileRecord, FileState, VersionRecord};
pub use folder::FolderRecord;
pub use quota::QuotaRecord;
