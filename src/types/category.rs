use serde::{Deserialize, Serialize};

/// Coarse content class a file is admitted under. Each category carries its
/// own size ceiling in the validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Document,
    Image,
    Video,
    Audio,
    Archive,
    Other,
}

impl FileCategory {
    /// Extension-based resolution, tried before any content sniffing.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "txt"
            | "md" | "rtf" | "csv" => Some(FileCategory::Document),
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" | "tiff" | "heic" => {
                Some(FileCategory::Image)
            }
            "mp4" | "mkv" | "avi" | "mov" | "webm" | "flv" | "wmv" => Some(FileCategory::Video),
            "mp3" | "wav" | "flac" | "ogg" | "aac" | "m4a" | "opus" => Some(FileCategory::Audio),
            "zip" | "tar" | "gz" | "bz2" | "xz" | "7z" | "rar" => Some(FileCategory::Archive),
            _ => None,
        }
    }

    /// Resolution from a MIME type, either declared by the client or sniffed
    /// from magic bytes.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf"
            | "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "text/plain"
            | "text/csv"
            | "text/markdown" => Some(FileCategory::Document),
            "application/zip"
            | "application/x-tar"
            | "application/gzip"
            | "application/x-bzip2"
            | "application/x-xz"
            | "application/x-7z-compressed"
            | "application/vnd.rar" => Some(FileCategory::Archive),
            m if m.starts_with("image/") => Some(FileCategory::Image),
            m if m.starts_with("video/") => Some(FileCategory::Video),
            m if m.starts_with("audio/") => Some(FileCategory::Audio),
            m if m.starts_with("text/") => Some(FileCategory::Document),
            _ => None,
        }
    }
}

/// Magic-byte sniff of the leading bytes; None when the content matches no
/// known signature.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}
