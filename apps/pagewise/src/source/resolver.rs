//! Document Source Resolver
//!
//! Turns user input into a [`SourceRef`] the engine can load. Rejection
//! happens here, before any engine interaction, so a refused source never
//! touches the live session.

use crate::config::UploadConfig;
use crate::error::{ReaderError, Result};

use super::format::DocumentFormat;
use super::object_url::ObjectUrlRegistry;
use super::types::{SourceInput, SourceLocation, SourceRef, UploadedFile};

/// Resolves inputs for a viewer of one document format
#[derive(Clone)]
pub struct SourceResolver {
    format: DocumentFormat,
    registry: ObjectUrlRegistry,
    max_upload_bytes: u64,
}

impl SourceResolver {
    pub fn new(format: DocumentFormat, upload: &UploadConfig) -> Self {
        Self::with_registry(format, upload, ObjectUrlRegistry::new())
    }

    pub fn with_registry(
        format: DocumentFormat,
        upload: &UploadConfig,
        registry: ObjectUrlRegistry,
    ) -> Self {
        Self {
            format,
            registry,
            max_upload_bytes: upload.max_upload_bytes,
        }
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    /// Validate `input` and produce a source handle
    pub fn resolve(&self, input: SourceInput) -> Result<SourceRef> {
        match input {
            SourceInput::Remote(url) => self.resolve_remote(url),
            SourceInput::Upload(file) => self.resolve_upload(file),
        }
    }

    fn resolve_remote(&self, url: String) -> Result<SourceRef> {
        let url = url.trim().to_string();
        let scheme = url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase());

        match scheme.as_deref() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(ReaderError::InvalidFormat(format!(
                    "unsupported document URL '{}'",
                    url
                )))
            }
        }

        // The URL is trusted to point at the viewer's format unless its
        // extension says otherwise
        let format = DocumentFormat::from_path(&url).unwrap_or(self.format);
        if format != self.format {
            return Err(ReaderError::InvalidFormat(format!(
                "expected a {:?} document, '{}' looks like {:?}",
                self.format, url, format
            )));
        }

        tracing::debug!(url = %url, ?format, "Resolved remote source");

        Ok(SourceRef::new(
            format,
            SourceLocation::Remote { url: url.clone() },
            url,
        ))
    }

    fn resolve_upload(&self, file: UploadedFile) -> Result<SourceRef> {
        if file.bytes.is_empty() {
            return Err(ReaderError::InvalidFormat(format!(
                "'{}' is empty",
                file.file_name
            )));
        }

        if file.bytes.len() as u64 > self.max_upload_bytes {
            return Err(ReaderError::InvalidFormat(format!(
                "'{}' is {} bytes, larger than the {} byte limit",
                file.file_name,
                file.bytes.len(),
                self.max_upload_bytes
            )));
        }

        let declared = if file.mime_type.trim().is_empty() {
            // Platforms report an empty type for unknown extensions
            mime_guess::from_path(&file.file_name)
                .first()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_default()
        } else {
            file.mime_type.clone()
        };

        if DocumentFormat::from_mime(&declared) != Some(self.format) {
            return Err(ReaderError::InvalidFormat(format!(
                "'{}' has type '{}', expected {}",
                file.file_name,
                declared,
                self.format.mime_type()
            )));
        }

        if let Some(sniffed) = DocumentFormat::from_magic_bytes(&file.bytes) {
            if sniffed != self.format {
                return Err(ReaderError::InvalidFormat(format!(
                    "'{}' is declared {} but its content is {:?}",
                    file.file_name, declared, sniffed
                )));
            }
        }

        let object_url = self.registry.create(file.bytes);

        tracing::info!(
            file_name = %file.file_name,
            href = %object_url.href(),
            format = ?self.format,
            "Accepted uploaded source"
        );

        Ok(SourceRef::new(
            self.format,
            SourceLocation::Blob(object_url),
            file.file_name,
        ))
    }
}
