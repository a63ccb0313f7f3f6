//! Domain events and fire-and-forget cascade delivery.

mod domain_event;
mod sink;

pub use domain_event::DomainEvent;
pub use sink::{DomainEventSink, MockDomainEventSink, NoOpDomainEventSink};

use std::sync::Arc;

use log::debug;

/// Deliver events to the sink on a detached background task.
///
/// The caller does not await delivery; sink failures are the sink's problem
/// and are logged there, never surfaced to the triggering operation.
pub fn spawn_cascade(sink: Arc<dyn DomainEventSink>, events: Vec<DomainEvent>) {
    if events.is_empty() {
        return;
    }
    tokio::spawn(async move {
        debug!("Dispatching {} domain event(s) to cascade sink", events.len());
        sink.emit_batch(events);
    });
}
