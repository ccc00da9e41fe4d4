//! Presentation contract: read-only snapshots in, intents out

use serde::Serialize;

use crate::engine::Theme;
use crate::source::SourceInput;

use super::state::ReaderStatus;

/// Scale control shown for the document layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Scale {
    Zoom { factor: f32 },
    FontScale { percent: u16 },
}

/// What the presentation layer renders
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSnapshot {
    pub status: ReaderStatus,
    pub current_position: u32,
    pub total_positions: u32,
    /// Location token of the current position, reflowable documents only
    pub current_location: Option<String>,
    pub error_message: Option<String>,
    pub scale: Scale,
    pub theme: Theme,
}

/// User intent accepted by the controller
#[derive(Debug, Clone)]
pub enum Intent {
    Next,
    Prev,
    GoTo(u32),
    ZoomIn,
    ZoomOut,
    IncreaseFont,
    DecreaseFont,
    ToggleTheme,
    Open(SourceInput),
}
