//! Pagewise reader core
//!
//! Navigation and state synchronization for PDF and EPUB viewers. Rendering
//! itself is delegated to external engines behind [`engine::ReaderEngine`].
//!
//! # Modules
//!
//! - `source`: validation of URLs and uploads into scoped document sources
//! - `engine`: engine façade, PDF and EPUB adapters, simulated engines
//! - `location`: EPUB CFI location tokens and generated location tables
//! - `navigation`: state machine and controller
//! - `gesture`: keyboard and swipe input

pub mod config;
pub mod engine;
pub mod error;
pub mod gesture;
pub mod location;
pub mod navigation;
pub mod source;
pub mod telemetry;

pub use config::ReaderConfig;
pub use error::{EngineError, ReaderError, Result};
pub use navigation::{Intent, ReaderController, ReaderSnapshot, ReaderStatus};
