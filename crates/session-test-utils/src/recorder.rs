//! Event capture for assertions.
//!
//! Delivery happens on the bus dispatcher task, so tests wait for events
//! with a bounded timeout instead of sleeping.

use session_client::{EventBus, ListenerId, SessionEvent};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default wait for an expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Records every payload delivered for one event.
pub struct EventRecorder<P> {
    receiver: mpsc::UnboundedReceiver<P>,
    listener: ListenerId,
}

impl<P> std::fmt::Debug for EventRecorder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder")
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

/// Register a recording handler for `E` on `bus`.
pub fn record<E: SessionEvent>(bus: &EventBus) -> EventRecorder<E::Payload> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let listener = bus.on::<E, _>(move |payload: &E::Payload| {
        let _ = sender.send(payload.clone());
    });
    EventRecorder { receiver, listener }
}

impl<P> EventRecorder<P> {
    #[must_use]
    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    /// Wait for the next payload.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`EVENT_TIMEOUT`].
    pub async fn next(&mut self) -> P {
        tokio::time::timeout(EVENT_TIMEOUT, self.receiver.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus dropped the recorder")
    }

    /// Wait for the next payload matching `predicate`, skipping others.
    ///
    /// # Panics
    ///
    /// Panics if no match arrives within [`EVENT_TIMEOUT`].
    pub async fn next_matching(&mut self, predicate: impl Fn(&P) -> bool) -> P {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let payload = tokio::time::timeout_at(deadline, self.receiver.recv())
                .await
                .expect("timed out waiting for matching event")
                .expect("event bus dropped the recorder");
            if predicate(&payload) {
                return payload;
            }
        }
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<P> {
        let mut payloads = Vec::new();
        while let Ok(payload) = self.receiver.try_recv() {
            payloads.push(payload);
        }
        payloads
    }
}

/// Wait until every event emitted so far has been delivered.
///
/// # Panics
///
/// Panics if the dispatcher has stopped.
pub async fn settle(bus: &EventBus) {
    bus.flush().await.expect("event dispatcher stopped");
}
