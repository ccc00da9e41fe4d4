//! Engine events
//!
//! Engines complete work on their own schedule. Everything they report is
//! pushed, tagged with the load generation it belongs to, onto an unbounded
//! channel that the controller drains. Sending never blocks the engine.

use tokio::sync::mpsc;

use crate::location::LocationToken;

use super::types::EngineHandle;

/// Something an engine or a background engine operation reported
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// `load` completed
    Loaded { handle: EngineHandle },
    /// `load` failed
    LoadFailed { message: String },
    /// Location index for layout pass `epoch` finished
    LocationIndexReady { epoch: u64, total: u32 },
    /// Location index for layout pass `epoch` failed
    LocationIndexFailed { epoch: u64, message: String },
    /// The engine displayed a new position
    LocationChanged {
        position: u32,
        total: u32,
        location: Option<LocationToken>,
    },
    /// Engine-side failure after loading
    Error { detail: String },
}

impl EngineEvent {
    /// Whether this event completes a background operation the controller
    /// is waiting for
    pub fn completes_operation(&self) -> bool {
        matches!(
            self,
            Self::Loaded { .. }
                | Self::LoadFailed { .. }
                | Self::LocationIndexReady { .. }
                | Self::LocationIndexFailed { .. }
        )
    }
}

/// Event stamped with the load generation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Create the event channel shared by a controller and its engines
pub fn channel() -> (mpsc::UnboundedSender<TaggedEvent>, mpsc::UnboundedReceiver<TaggedEvent>) {
    mpsc::unbounded_channel()
}

/// Non-blocking event emitter bound to one load generation
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Push an event; returns `false` when the controller is gone
    pub fn emit(&self, event: EngineEvent) -> bool {
        let delivered = self
            .tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok();

        if !delivered {
            tracing::trace!(generation = self.generation, "Event receiver dropped");
        }
        delivered
    }

    pub fn location_changed(&self, position: u32, total: u32, location: Option<LocationToken>) -> bool {
        self.emit(EngineEvent::LocationChanged {
            position,
            total,
            location,
        })
    }

    pub fn error(&self, detail: impl Into<String>) -> bool {
        self.emit(EngineEvent::Error {
            detail: detail.into(),
        })
    }
}
