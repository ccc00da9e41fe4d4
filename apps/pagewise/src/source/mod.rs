//! Document sources
//!
//! Validation of remote URLs and uploaded files, and the scoped object URLs
//! that keep uploaded bytes alive for exactly one reader session.

mod format;
mod object_url;
mod resolver;
mod types;

pub use format::DocumentFormat;
pub use object_url::{ObjectUrl, ObjectUrlRegistry};
pub use resolver::SourceResolver;
pub use types::{SourceInput, SourceLocation, SourceRef, UploadedFile};
