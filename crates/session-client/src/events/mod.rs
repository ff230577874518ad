//! Typed event bus.
//!
//! The bus is the single delivery point for asynchronous notifications.
//!
//! - Handlers register per event with [`EventBus::on`] and are invoked in
//!   registration order. [`EventBus::off`] removes one handler by its
//!   [`ListenerId`].
//! - Emission snapshots the current handlers and queues the delivery on the
//!   dispatcher task, so the emitter never blocks and a handler registered
//!   after an event fired never sees it.
//! - The dispatcher is a single FIFO, so handlers observe each event name in
//!   emission order.
//! - A panicking handler is logged and skipped; the remaining handlers still
//!   run.

mod catalog;

pub use catalog::*;

use crate::errors::SdkError;
use crate::observability::metrics as sdk_metrics;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Ordered handler list for one event.
#[doc(hidden)]
pub struct Listeners<P> {
    entries: Vec<(ListenerId, Handler<P>)>,
}

impl<P> Default for Listeners<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P> Listeners<P> {
    fn push(&mut self, id: ListenerId, handler: Handler<P>) {
        self.entries.push((id, handler));
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn snapshot(&self) -> Vec<Handler<P>> {
        self.entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A snapshotted set of handlers bound to one payload.
pub(crate) struct Delivery {
    kind: EventKind,
    listeners: usize,
    run: Box<dyn FnOnce() -> usize + Send>,
}

impl Delivery {
    fn new<P>(kind: EventKind, handlers: Vec<Handler<P>>, payload: P) -> Self
    where
        P: Send + Sync + 'static,
    {
        let listeners = handlers.len();
        let run = Box::new(move || {
            let mut panicked = 0;
            for handler in handlers {
                if catch_unwind(AssertUnwindSafe(|| handler(&payload))).is_err() {
                    panicked += 1;
                    error!(
                        target: "sdk.events",
                        event = kind.as_str(),
                        "Event handler panicked"
                    );
                    sdk_metrics::record_handler_panic(kind.as_str());
                }
            }
            panicked
        });

        Self {
            kind,
            listeners,
            run,
        }
    }
}

enum BusMessage {
    Deliver(Delivery),
    Flush(oneshot::Sender<()>),
}

struct BusInner {
    table: Mutex<ListenerTable>,
    next_id: AtomicU64,
    sender: mpsc::UnboundedSender<BusMessage>,
    cancel_token: CancellationToken,
}

/// Handle to the event bus. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("is_cancelled", &self.inner.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Spawn the dispatcher task and return a handle to the bus.
    pub fn spawn(cancel_token: CancellationToken) -> (EventBus, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let dispatcher = EventDispatcher {
            receiver,
            cancel_token: cancel_token.clone(),
            delivered: 0,
        };
        let task_handle = tokio::spawn(dispatcher.run());

        let bus = EventBus {
            inner: Arc::new(BusInner {
                table: Mutex::new(ListenerTable::default()),
                next_id: AtomicU64::new(1),
                sender,
                cancel_token,
            }),
        };

        (bus, task_handle)
    }

    /// Register `handler` for event `E`.
    pub fn on<E, F>(&self, handler: F) -> ListenerId
    where
        E: SessionEvent,
        F: Fn(&E::Payload) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        E::listeners_mut(&mut self.inner.table.lock()).push(id, Arc::new(handler));
        debug!(
            target: "sdk.events",
            event = E::KIND.as_str(),
            listener = %id,
            "Listener registered"
        );
        id
    }

    /// Deregister one handler. Returns whether it was registered for `E`.
    pub fn off<E: SessionEvent>(&self, id: ListenerId) -> bool {
        let removed = E::listeners_mut(&mut self.inner.table.lock()).remove(id);
        debug!(
            target: "sdk.events",
            event = E::KIND.as_str(),
            listener = %id,
            removed,
            "Listener deregistered"
        );
        removed
    }

    /// Number of handlers currently registered for `E`.
    #[must_use]
    pub fn listener_count<E: SessionEvent>(&self) -> usize {
        E::listeners(&self.inner.table.lock()).len()
    }

    /// Drop every registered handler.
    pub fn remove_all_listeners(&self) {
        self.inner.table.lock().clear();
    }

    /// Publish an event. Never blocks.
    pub(crate) fn emit(&self, event: Event) {
        let kind = event.kind();
        sdk_metrics::record_event_emitted(kind.as_str());

        let delivery = self.inner.table.lock().prepare(event);
        if delivery.listeners == 0 {
            return;
        }

        if self.inner.sender.send(BusMessage::Deliver(delivery)).is_err() {
            warn!(
                target: "sdk.events",
                event = kind.as_str(),
                "Event dispatcher stopped, event not delivered"
            );
        }
    }

    /// Publish a typed payload.
    pub(crate) fn emit_typed<E: SessionEvent>(&self, payload: E::Payload) {
        self.emit(E::wrap(payload));
    }

    /// Resolve once every event emitted before this call has been delivered.
    pub async fn flush(&self) -> Result<(), SdkError> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .sender
            .send(BusMessage::Flush(tx))
            .map_err(|e| SdkError::Internal(format!("event dispatcher stopped: {e}")))?;

        rx.await
            .map_err(|e| SdkError::Internal(format!("flush receive failed: {e}")))
    }

    /// Stop the dispatcher.
    pub fn cancel(&self) {
        self.inner.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }
}

/// Dispatcher task: runs queued deliveries in FIFO order.
struct EventDispatcher {
    receiver: mpsc::UnboundedReceiver<BusMessage>,
    cancel_token: CancellationToken,
    delivered: u64,
}

impl EventDispatcher {
    #[instrument(skip_all, name = "sdk.events.dispatcher")]
    async fn run(mut self) {
        debug!(target: "sdk.events", "EventDispatcher started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sdk.events",
                        "EventDispatcher received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(BusMessage::Deliver(delivery)) => {
                            let kind = delivery.kind;
                            let panicked = (delivery.run)();
                            self.delivered += 1;
                            if panicked > 0 {
                                warn!(
                                    target: "sdk.events",
                                    event = kind.as_str(),
                                    listeners = delivery.listeners,
                                    panicked,
                                    "Event delivered with failing handlers"
                                );
                            }
                        }
                        Some(BusMessage::Flush(respond_to)) => {
                            let _ = respond_to.send(());
                        }
                        None => break,
                    }
                }
            }
        }

        info!(
            target: "sdk.events",
            delivered = self.delivered,
            "EventDispatcher stopped"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{ChatPrivilege, ConnectionState, Participant, ReconnectReason, UserId};
    use std::sync::atomic::AtomicUsize;

    fn spawn_bus() -> EventBus {
        let (bus, _task) = EventBus::spawn(CancellationToken::new());
        bus
    }

    fn batch(ids: &[u32]) -> Vec<Participant> {
        ids.iter()
            .map(|id| Participant::new(UserId(*id), format!("User {id}")))
            .collect()
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let bus = spawn_bus();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.on::<kinds::UserAdded, _>(move |_| order.lock().push(tag));
        }

        bus.emit_typed::<kinds::UserAdded>(batch(&[1]));
        bus.flush().await.unwrap();

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_late_listener_does_not_receive_earlier_event() {
        let bus = spawn_bus();
        let early = Arc::new(Mutex::new(Vec::new()));
        let late_calls = Arc::new(AtomicUsize::new(0));

        let early_clone = Arc::clone(&early);
        bus.on::<kinds::UserAdded, _>(move |batch: &Vec<Participant>| {
            early_clone.lock().push(batch.len());
        });

        bus.emit_typed::<kinds::UserAdded>(batch(&[1, 2, 3]));

        // Registered after emission but before the dispatcher ran.
        let late_clone = Arc::clone(&late_calls);
        bus.on::<kinds::UserAdded, _>(move |_| {
            late_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.flush().await.unwrap();

        assert_eq!(*early.lock(), vec![3]);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_off_removes_only_that_handler() {
        let bus = spawn_bus();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a_clone = Arc::clone(&a);
        let id_a = bus.on::<kinds::ChatPrivilegeChange, _>(move |_| {
            a_clone.fetch_add(1, Ordering::SeqCst);
        });
        let b_clone = Arc::clone(&b);
        bus.on::<kinds::ChatPrivilegeChange, _>(move |_| {
            b_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.off::<kinds::ChatPrivilegeChange>(id_a));
        // Wrong event kind: nothing removed.
        assert!(!bus.off::<kinds::UserAdded>(id_a));
        assert_eq!(bus.listener_count::<kinds::ChatPrivilegeChange>(), 1);

        bus.emit_typed::<kinds::ChatPrivilegeChange>(ChatPrivilegePayload {
            chat_privilege: ChatPrivilege::NoOne,
        });
        bus.flush().await.unwrap();

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let bus = spawn_bus();
        let reached = Arc::new(AtomicUsize::new(0));

        bus.on::<kinds::ConnectionChange, _>(|_| panic!("handler failure"));
        let reached_clone = Arc::clone(&reached);
        bus.on::<kinds::ConnectionChange, _>(move |_| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit_typed::<kinds::ConnectionChange>(ConnectionState::Connected);
        bus.emit_typed::<kinds::ConnectionChange>(ConnectionState::Connected);
        bus.flush().await.unwrap();

        assert_eq!(reached.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_per_event_emission_order_is_preserved() {
        let bus = spawn_bus();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        bus.on::<kinds::ConnectionChange, _>(move |state: &ConnectionState| {
            seen_clone.lock().push(*state);
        });

        let sequence = [
            ConnectionState::Reconnecting(Some(ReconnectReason::Failover)),
            ConnectionState::Connected,
            ConnectionState::Reconnecting(Some(ReconnectReason::OnHold)),
            ConnectionState::Connected,
        ];
        for state in sequence {
            bus.emit_typed::<kinds::ConnectionChange>(state);
        }
        bus.flush().await.unwrap();

        assert_eq!(*seen.lock(), sequence.to_vec());
    }

    #[tokio::test]
    async fn test_handler_may_register_reentrantly() {
        let bus = spawn_bus();
        let nested_calls = Arc::new(AtomicUsize::new(0));

        let bus_clone = bus.clone();
        let nested_clone = Arc::clone(&nested_calls);
        bus.on::<kinds::UserAdded, _>(move |_| {
            let nested = Arc::clone(&nested_clone);
            bus_clone.on::<kinds::UserRemoved, _>(move |_| {
                nested.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.emit_typed::<kinds::UserAdded>(batch(&[1]));
        bus.flush().await.unwrap();
        bus.emit_typed::<kinds::UserRemoved>(batch(&[1]));
        bus.flush().await.unwrap();

        assert_eq!(nested_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_fails_after_cancel() {
        let (bus, task) = EventBus::spawn(CancellationToken::new());
        bus.cancel();
        task.await.unwrap();

        assert!(bus.is_cancelled());
        assert!(matches!(bus.flush().await, Err(SdkError::Internal(_))));
    }

    #[tokio::test]
    async fn test_remove_all_listeners() {
        let bus = spawn_bus();
        bus.on::<kinds::UserAdded, _>(|_| {});
        bus.on::<kinds::ChatOnMessage, _>(|_| {});
        bus.remove_all_listeners();

        assert_eq!(bus.listener_count::<kinds::UserAdded>(), 0);
        assert_eq!(bus.listener_count::<kinds::ChatOnMessage>(), 0);
    }
}
