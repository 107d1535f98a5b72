//! Event emitter trait for publishing bridge events.
//!
//! Implementations handle transport details (subscriber queues, SSE, logging).

use crate::events::BridgeEvent;

/// Trait for emitting bridge events.
///
/// Keeps queue and channel types out of the runtime's public API surface.
///
/// # Implementations
///
/// - `NoopEmitter` - for tests and contexts without listeners
/// - `EventBroadcaster` in the runtime crate - per-subscriber bounded queues
pub trait BridgeEventEmitter: Send + Sync {
    /// Emit an event.
    ///
    /// Must not block: publishers include the per-server I/O loops.
    fn emit(&self, event: BridgeEvent);

    /// Clone this emitter into a boxed trait object.
    fn clone_box(&self) -> Box<dyn BridgeEventEmitter>;
}

/// Emitter that discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl BridgeEventEmitter for NoopEmitter {
    fn emit(&self, _event: BridgeEvent) {}

    fn clone_box(&self) -> Box<dyn BridgeEventEmitter> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_noop_emitter_accepts_events() {
        let emitter: Arc<dyn BridgeEventEmitter> = Arc::new(NoopEmitter::new());
        emitter.emit(BridgeEvent::server_added("fs"));
        let _boxed = emitter.clone_box();
    }
}
