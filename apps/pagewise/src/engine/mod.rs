//! Rendering engine façade
//!
//! The controller drives every document through [`ReaderEngine`]. Two
//! adapters cover the supported layouts:
//!
//! - [`PagedAdapter`] wraps a page-indexed [`PageRenderer`] (PDF)
//! - [`ReflowAdapter`] wraps a reflowable [`ReflowRenderer`] (EPUB)
//!
//! [`sim`] provides in-memory renderers for both.

mod events;
mod paged;
mod reflow;
pub mod sim;
mod traits;
mod types;

pub use events::{channel, EngineEvent, EventSink, TaggedEvent};
pub use paged::PagedAdapter;
pub use reflow::ReflowAdapter;
pub use traits::{
    OpenedDocument, PageRenderer, ReaderEngine, ReflowEvent, ReflowListener, ReflowRenderer,
};
pub use types::{
    CrossOriginPolicy, EngineHandle, Flow, Layout, Position, RenderOptions, Spread, StyleOptions,
    Theme, Viewport,
};
