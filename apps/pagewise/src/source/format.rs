//! Document format detection

use serde::{Deserialize, Serialize};

/// Document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Epub,
}

impl DocumentFormat {
    /// Canonical MIME type
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Epub => "application/epub+zip",
        }
    }

    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "epub" => Some(Self::Epub),
            _ => None,
        }
    }

    /// Detect format from a MIME type, ignoring parameters and case
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" | "application/x-pdf" => Some(Self::Pdf),
            "application/epub+zip" => Some(Self::Epub),
            _ => None,
        }
    }

    /// Detect format from the extension of a path or URL
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let file_name = path.rsplit('/').next().unwrap_or_default();
        let (_, ext) = file_name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Detect format from magic bytes
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }

        if bytes.starts_with(b"%PDF") {
            return Some(Self::Pdf);
        }

        // EPUB: a ZIP whose first entry is the "mimetype" file holding
        // "application/epub+zip" at offset 30. Other ZIP formats (.docx, .jar)
        // are not assumed to be EPUBs.
        if bytes.starts_with(b"PK") && bytes.len() > 30 {
            let head = &bytes[..bytes.len().min(58)];
            if head.windows(4).any(|window| window == b"epub") {
                return Some(Self::Epub);
            }
        }

        None
    }
}
