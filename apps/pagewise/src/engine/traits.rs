//! Engine traits
//!
//! [`ReaderEngine`] is the uniform façade the navigation controller talks
//! to. [`PageRenderer`] and [`ReflowRenderer`] are the raw capabilities of the
//! external rendering engines; the adapters in this module translate them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::location::LocationToken;
use crate::source::{DocumentFormat, SourceRef};

use super::events::EventSink;
use super::types::{EngineHandle, Layout, Position, RenderOptions, StyleOptions, Theme, Viewport};

/// Format-agnostic rendering engine façade
///
/// Every operation may suspend. Position changes are reported through the
/// [`EventSink`] passed to `load`, never through return values.
#[async_trait]
pub trait ReaderEngine: Send + Sync {
    /// How this engine addresses positions
    fn layout(&self) -> Layout;

    /// Document format this engine renders
    fn format(&self) -> DocumentFormat;

    /// Load a document. Events for the returned handle go to `events`.
    async fn load(
        &self,
        source: &SourceRef,
        options: &RenderOptions,
        events: EventSink,
    ) -> EngineResult<EngineHandle>;

    /// Bind the handle's output into `target`; idempotent per handle
    async fn mount_to(&self, handle: EngineHandle, target: &Arc<Viewport>) -> EngineResult<()>;

    /// Compute the addressable positions for the current style; returns the total
    async fn generate_location_index(
        &self,
        handle: EngineHandle,
        granularity: u32,
    ) -> EngineResult<u32>;

    /// Display a position
    async fn display_at(&self, handle: EngineHandle, position: &Position) -> EngineResult<()>;

    /// Advance one page
    async fn next(&self, handle: EngineHandle) -> EngineResult<()>;

    /// Go back one page
    async fn prev(&self, handle: EngineHandle) -> EngineResult<()>;

    /// Push zoom, font scale and theme to the handle
    async fn apply_style(&self, handle: EngineHandle, style: &StyleOptions) -> EngineResult<()>;

    /// Release everything the engine holds for the handle
    async fn destroy(&self, handle: EngineHandle) -> EngineResult<()>;
}

/// Document opened by a [`PageRenderer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedDocument {
    pub handle: EngineHandle,
    pub page_count: u32,
}

/// Raw page-indexed engine (PDF raster and text layers)
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Fetch and parse the document
    async fn open(&self, source: &SourceRef, options: &RenderOptions) -> EngineResult<OpenedDocument>;

    /// Render one 1-based page into the target element
    async fn render_page(
        &self,
        handle: EngineHandle,
        target: &str,
        page: u32,
        style: &StyleOptions,
    ) -> EngineResult<()>;

    /// Free decoded pages and workers
    async fn close(&self, handle: EngineHandle) -> EngineResult<()>;
}

/// Notification from a [`ReflowRenderer`]
#[derive(Debug, Clone, PartialEq)]
pub enum ReflowEvent {
    /// The visible range now starts at `start`
    Relocated { start: LocationToken },
    /// Rendering failed after the book opened
    Failed { detail: String },
}

/// Callback registered with [`ReflowRenderer::on`]
pub type ReflowListener = Arc<dyn Fn(ReflowEvent) + Send + Sync>;

/// Raw reflowable layout engine (EPUB)
#[async_trait]
pub trait ReflowRenderer: Send + Sync {
    /// Fetch and open the book
    async fn open(&self, source: &SourceRef, options: &RenderOptions) -> EngineResult<EngineHandle>;

    /// Subscribe to relocation and failure notifications
    fn on(&self, handle: EngineHandle, listener: ReflowListener) -> EngineResult<()>;

    /// Attach the rendition to the target element
    async fn render_to(&self, handle: EngineHandle, target: &str) -> EngineResult<()>;

    /// Full layout pass producing the location table, in reading order
    async fn generate_locations(
        &self,
        handle: EngineHandle,
        granularity: u32,
    ) -> EngineResult<Vec<LocationToken>>;

    /// Display the page containing `target`, or the start of the book
    async fn display(&self, handle: EngineHandle, target: Option<&LocationToken>) -> EngineResult<()>;

    async fn next(&self, handle: EngineHandle) -> EngineResult<()>;

    async fn prev(&self, handle: EngineHandle) -> EngineResult<()>;

    /// Change font size and theme; reflows the content
    async fn set_style(
        &self,
        handle: EngineHandle,
        font_scale_percent: u16,
        theme: Theme,
    ) -> EngineResult<()>;

    /// Destroy the rendition and book
    async fn close(&self, handle: EngineHandle) -> EngineResult<()>;
}
