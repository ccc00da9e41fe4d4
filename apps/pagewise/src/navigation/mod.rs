//! Reader navigation
//!
//! [`NavigationState`] is the synchronous state machine; [`ReaderController`]
//! feeds it user intents and engine events and turns its decisions into
//! engine commands.

mod controller;
mod state;
mod view;

pub use controller::{Navigation, ReaderController, ReaderSession};
pub use state::{NavigationState, NoopReason, ReaderStatus, EMPTY_DOCUMENT_MESSAGE};
pub use view::{Intent, ReaderSnapshot, Scale};
