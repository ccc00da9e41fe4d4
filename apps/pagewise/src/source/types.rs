//! Source types

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::format::DocumentFormat;
use super::object_url::ObjectUrl;

/// User-provided document input
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Remote document, fetched by the engine
    Remote(String),
    /// Locally selected file
    Upload(UploadedFile),
}

impl SourceInput {
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote(url.into())
    }
}

/// A locally selected file
#[derive(Clone)]
pub struct UploadedFile {
    /// Original file name
    pub file_name: String,
    /// Declared MIME type, empty when the platform could not tell
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Where the engine reads the document from
#[derive(Debug, Clone)]
pub enum SourceLocation {
    Remote { url: String },
    Blob(ObjectUrl),
}

/// Accepted document source, immutable once created
///
/// Cheap to clone; clones share the underlying object URL.
#[derive(Debug, Clone)]
pub struct SourceRef {
    inner: Arc<SourceRefInner>,
}

#[derive(Debug)]
struct SourceRefInner {
    id: Uuid,
    format: DocumentFormat,
    location: SourceLocation,
    display_name: String,
}

impl SourceRef {
    pub(crate) fn new(format: DocumentFormat, location: SourceLocation, display_name: String) -> Self {
        Self {
            inner: Arc::new(SourceRefInner {
                id: Uuid::new_v4(),
                format,
                location,
                display_name,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn format(&self) -> DocumentFormat {
        self.inner.format
    }

    pub fn location(&self) -> &SourceLocation {
        &self.inner.location
    }

    /// File name or URL, for logs and titles
    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// URL handed to the engine
    pub fn href(&self) -> &str {
        match &self.inner.location {
            SourceLocation::Remote { url } => url,
            SourceLocation::Blob(object_url) => object_url.href(),
        }
    }

    /// In-process bytes for uploaded sources
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        match &self.inner.location {
            SourceLocation::Remote { .. } => None,
            SourceLocation::Blob(object_url) => object_url.bytes(),
        }
    }

    /// Release the transient object URL, if any. Idempotent.
    pub fn release(&self) {
        if let SourceLocation::Blob(object_url) = &self.inner.location {
            object_url.revoke();
        }
    }
}
