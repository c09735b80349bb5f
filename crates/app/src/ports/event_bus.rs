//! Event bus port — non-blocking publication of domain events.

use std::sync::Arc;

use homelink_domain::event::Event;

/// Publishes domain events to interested consumers.
///
/// Enqueueing never blocks the caller: producers run inside protocol read
/// loops and must not stall behind a slow consumer.
pub trait EventPublisher: Send + Sync {
    /// Hand an event to every consumer subscribed to its kind.
    fn enqueue(&self, event: Event);
}

impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    fn enqueue(&self, event: Event) {
        (**self).enqueue(event);
    }
}
