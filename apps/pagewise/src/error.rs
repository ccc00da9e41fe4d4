//! Reader error types
//!
//! Unified error handling for the source resolver, the engine adapters and
//! the navigation controller.

use thiserror::Error;

use crate::engine::EngineHandle;

/// Errors raised by a rendering engine adapter or the engine behind it
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine failed to fetch or parse the document
    #[error("Failed to load document: {0}")]
    Load(String),

    /// Command issued before the handle finished loading or laying out
    #[error("Engine not ready: {0}")]
    NotReady(String),

    /// Handle was never issued by this engine or was already destroyed
    #[error("Unknown engine handle: {0}")]
    UnknownHandle(EngineHandle),

    /// Viewport is still owned by another handle
    #[error("Viewport {viewport} is already mounted by {occupant}")]
    ViewportBusy {
        viewport: String,
        occupant: EngineHandle,
    },

    /// Page or section could not be rendered
    #[error("Render error: {0}")]
    Render(String),

    /// Location index generation failed
    #[error("Layout error: {0}")]
    Layout(String),

    /// Position does not exist in the document
    #[error("Position out of range: {0}")]
    OutOfRange(String),
}

/// Controller-facing error type
///
/// Only `InvalidFormat` and `Load` are meant for the user; everything else is
/// logged by the controller and never changes the visible state.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Source rejected before any engine interaction
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Document could not be loaded
    #[error("{0}")]
    Load(String),

    /// Engine command failure
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type alias for reader operations
pub type Result<T> = std::result::Result<T, ReaderError>;

impl EngineError {
    /// Text shown to the user when this error ends a load
    pub fn user_message(&self) -> String {
        match self {
            Self::Load(message) | Self::Layout(message) | Self::Render(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_strips_prefix() {
        let error = EngineError::Load("network timeout".to_string());
        assert_eq!(error.user_message(), "network timeout");
        assert_eq!(error.to_string(), "Failed to load document: network timeout");

        let busy = EngineError::ViewportBusy {
            viewport: "viewer".to_string(),
            occupant: EngineHandle(3),
        };
        assert_eq!(busy.user_message(), "Viewport viewer is already mounted by engine#3");
    }

    #[test]
    fn test_engine_error_converts() {
        let error: ReaderError = EngineError::NotReady("engine#1".to_string()).into();
        assert!(matches!(error, ReaderError::Engine(EngineError::NotReady(_))));
    }
}
