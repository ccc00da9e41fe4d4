//! Engine-facing types

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::location::LocationToken;

/// Opaque handle to a document loaded by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineHandle(pub u64);

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// How positions are addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Discrete pages with integer positions (PDF)
    Paged,
    /// Engine-computed locations behind ordered tokens (EPUB)
    Reflowable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    #[default]
    Paginated,
    Scrolled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spread {
    #[default]
    None,
    Auto,
}

/// Credentials mode for cross-origin document fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossOriginPolicy {
    #[default]
    Anonymous,
    UseCredentials,
}

/// Options recognized by [`ReaderEngine::load`](super::ReaderEngine::load)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub flow: Flow,
    pub spread: Spread,
    pub scripts_allowed: bool,
    pub cross_origin: CrossOriginPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// Visual style pushed to a live handle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleOptions {
    pub zoom: f32,
    pub font_scale_percent: u16,
    pub theme: Theme,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            font_scale_percent: 100,
            theme: Theme::Light,
        }
    }
}

/// Display target
#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    /// 1-based page, or 1-based entry of the location table
    Page(u32),
    Location(LocationToken),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(page) => write!(f, "page {}", page),
            Self::Location(token) => write!(f, "{}", token),
        }
    }
}

/// The single mount point engines render into
///
/// Only one handle may occupy it; a new handle can mount only after the
/// previous occupant was released.
#[derive(Debug)]
pub struct Viewport {
    id: String,
    occupant: Mutex<Option<EngineHandle>>,
}

impl Viewport {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            occupant: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn occupant(&self) -> Option<EngineHandle> {
        *self.occupant.lock()
    }

    /// Bind `handle` to this viewport; idempotent for the current occupant
    pub fn claim(&self, handle: EngineHandle) -> EngineResult<()> {
        let mut occupant = self.occupant.lock();
        match *occupant {
            Some(current) if current != handle => Err(EngineError::ViewportBusy {
                viewport: self.id.clone(),
                occupant: current,
            }),
            _ => {
                *occupant = Some(handle);
                Ok(())
            }
        }
    }

    /// Unbind `handle`; no-op when it is not the occupant
    pub fn release(&self, handle: EngineHandle) {
        let mut occupant = self.occupant.lock();
        if *occupant == Some(handle) {
            *occupant = None;
        }
    }
}
