//! Admission policy for uploads: name hygiene, per-category size ceilings
//! and an executable-content sniff. Pure over the provided bytes and
//! metadata; a policy reject is reported in the result, never as an error.

use serde::{Deserialize, Serialize};

use crate::types::{sniff_mime, FileCategory};

pub const MAX_NAME_LEN: usize = 255;

const MIB: u64 = 1024 * 1024;

/// Extensions that may never appear as the final or a trailing "double"
/// extension of an uploaded name.
const EXECUTABLE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "scr", "msi", "dll", "sh", "ps1", "vbs", "jar",
];

/// Windows device names are reserved regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub category: FileCategory,
    pub max_allowed_size: u64,
    pub reason: Option<String>,
}

impl ValidationReport {
    fn reject(category: FileCategory, max: u64, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            category,
            max_allowed_size: max,
            reason: Some(reason.into()),
        }
    }

    fn accept(category: FileCategory, max: u64) -> Self {
        Self {
            ok: true,
            category,
            max_allowed_size: max,
            reason: None,
        }
    }
}

/// Size ceiling per admitted category.
pub fn max_size_for(category: FileCategory) -> u64 {
    match category {
        FileCategory::Document => 50 * MIB,
        FileCategory::Image => 25 * MIB,
        FileCategory::Video => 2048 * MIB,
        FileCategory::Audio => 200 * MIB,
        FileCategory::Archive => 512 * MIB,
        FileCategory::Other => 100 * MIB,
    }
}

fn extension(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty())
}

fn resolve_category(name: &str, declared_mime: &str, sniffed: Option<&str>) -> FileCategory {
    extension(name)
        .and_then(FileCategory::from_extension)
        .or_else(|| sniffed.and_then(FileCategory::from_mime))
        .or_else(|| FileCategory::from_mime(declared_mime))
        .unwrap_or(FileCategory::Other)
}

/// True when the leading bytes look like native or script executable
/// content (PE, ELF, Mach-O, shebang).
fn looks_executable(data: &[u8]) -> bool {
    data.starts_with(b"MZ")
        || data.starts_with(&[0x7f, b'E', b'L', b'F'])
        || data.starts_with(&[0xfe, 0xed, 0xfa, 0xce])
        || data.starts_with(&[0xfe, 0xed, 0xfa, 0xcf])
        || data.starts_with(&[0xcf, 0xfa, 0xed, 0xfe])
        || data.starts_with(b"#!")
}

fn check_name(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("file name is empty".into());
    }
    if name.len() > MAX_NAME_LEN {
        return Some(format!("file name exceeds {} bytes", MAX_NAME_LEN));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Some("file name contains a path traversal sequence".into());
    }
    if name.chars().any(|c| c.is_control()) {
        return Some("file name contains control characters".into());
    }
    if name.starts_with(' ') || name.ends_with(' ') || name.ends_with('.') {
        return Some("file name has leading/trailing whitespace or dot".into());
    }

    let stem = name.split('.').next().unwrap_or(name).to_ascii_lowercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return Some(format!("'{}' is a reserved device name", stem));
    }

    // Any dot-separated part matching the denylist is treated as a double
    // extension, e.g. "report.pdf.exe" or "invoice.exe.txt".
    let parts: Vec<&str> = name.split('.').skip(1).collect();
    for part in &parts {
        if EXECUTABLE_EXTENSIONS.contains(&part.to_ascii_lowercase().as_str()) {
            return Some(format!("executable extension '{}' is not allowed", part));
        }
    }
    None
}

/// Validates an upload before any resource is reserved. `sniffed_bytes` is
/// the leading slice of the content, enough for magic-byte detection.
pub fn validate(
    name: &str,
    declared_mime: &str,
    size: u64,
    sniffed_bytes: &[u8],
) -> ValidationReport {
    let sniffed = sniff_mime(sniffed_bytes);
    let category = resolve_category(name, declared_mime, sniffed);
    let max = max_size_for(category);

    if let Some(reason) = check_name(name) {
        return ValidationReport::reject(category, max, reason);
    }
    if size > max {
        return ValidationReport::reject(
            category,
            max,
            format!("size {} exceeds the {} byte limit for {:?}", size, max, category),
        );
    }
    if looks_executable(sniffed_bytes) {
        return ValidationReport::reject(
            category,
            max,
            "content sniffs as executable behind a non-executable name",
        );
    }

    ValidationReport::accept(category, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_document() {
        let report = validate("notes.txt", "text/plain", 1024, b"hello world");
        assert!(report.ok, "{:?}", report.reason);
        assert_eq!(report.category, FileCategory::Document);
    }

    #[test]
    fn rejects_oversize() {
        let max = max_size_for(FileCategory::Image);
        let report = validate("big.png", "image/png", max + 1, &[0x89, b'P', b'N', b'G']);
        assert!(!report.ok);
        assert_eq!(report.max_allowed_size, max);
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(!validate("../etc/passwd", "text/plain", 10, b"x").ok);
        assert!(!validate("a/b.txt", "text/plain", 10, b"x").ok);
        assert!(!validate("a\\b.txt", "text/plain", 10, b"x").ok);
    }

    #[test]
    fn rejects_reserved_device_names() {
        assert!(!validate("CON.txt", "text/plain", 10, b"x").ok);
        assert!(!validate("lpt1.pdf", "application/pdf", 10, b"x").ok);
    }

    #[test]
    fn rejects_executable_double_extension() {
        assert!(!validate("report.pdf.exe", "application/pdf", 10, b"x").ok);
        assert!(!validate("invoice.exe.txt", "text/plain", 10, b"x").ok);
    }

    #[test]
    fn rejects_sniffed_executable_content() {
        let elf = [0x7fu8, b'E', b'L', b'F', 2, 1, 1, 0];
        assert!(!validate("data.txt", "text/plain", 8, &elf).ok);
        assert!(!validate("script.txt", "text/plain", 12, b"#!/bin/sh\n").ok);
    }

    #[test]
    fn rejects_bad_charset_and_length() {
        assert!(!validate("", "text/plain", 1, b"x").ok);
        assert!(!validate("bad\u{0007}name.txt", "text/plain", 1, b"x").ok);
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(!validate(&long, "text/plain", 1, b"x").ok);
    }

    #[test]
    fn category_falls_back_to_sniffed_then_declared() {
        let png = [0x89u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        let report = validate("noext", "application/octet-stream", 10, &png);
        assert_eq!(report.category, FileCategory::Image);

        let report = validate("noext", "audio/mpeg", 10, b"not magic");
        assert_eq!(report.category, FileCategory::Audio);

        let report = validate("noext", "application/octet-stream", 10, b"not magic");
        assert_eq!(report.category, FileCategory::Other);
    }
}
