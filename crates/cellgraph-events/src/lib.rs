//! Synchronous, single-threaded publish/subscribe.
//!
//! Every emitter (model, view, selection, undo manager) owns an
//! [`EventSource`] keyed by [`EventName`]. Firing an event calls the listeners
//! registered for that name in registration order, before returning. The
//! listener list is snapshotted when dispatch starts, so listeners may add or
//! remove listeners, or mutate the emitter, without disturbing the dispatch in
//! progress.

use crossbeam_channel::{Receiver, unbounded};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

pub const EVENTS_TARGET: &str = "cellgraph::events";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    // Model
    BeginUpdate,
    EndUpdate,
    Change,
    Undoable,

    // Undo manager
    Undo,
    Redo,
    Clear,

    // View
    Scale,
    Translate,
    CurrentRoot,
    Validated,
    Diagnostic,
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeginUpdate => "beginUpdate",
            Self::EndUpdate => "endUpdate",
            Self::Change => "change",
            Self::Undoable => "undoable",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Clear => "clear",
            Self::Scale => "scale",
            Self::Translate => "translate",
            Self::CurrentRoot => "currentRoot",
            Self::Validated => "validated",
            Self::Diagnostic => "diagnostic",
        };
        f.write_str(name)
    }
}

/// Payload carried by an emitter's events.
pub trait Event: Clone + 'static {
    fn name(&self) -> EventName;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener<S, E> = Rc<dyn Fn(&mut S, &E)>;

struct Registration<S, E> {
    id: ListenerId,
    /// `None` receives every event.
    name: Option<EventName>,
    listener: Listener<S, E>,
}

/// Listener registry owned by an emitter of type `S`.
pub struct EventSource<S, E> {
    registrations: Vec<Registration<S, E>>,
    next_id: u64,
    enabled: bool,
}

impl<S: 'static, E: Event> Default for EventSource<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> fmt::Debug for EventSource<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("listeners", &self.registrations.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl<S: 'static, E: Event> EventSource<S, E> {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            next_id: 0,
            enabled: true,
        }
    }

    pub fn add_listener<F>(&mut self, name: EventName, listener: F) -> ListenerId
    where
        F: Fn(&mut S, &E) + 'static,
    {
        self.register(Some(name), Rc::new(listener))
    }

    /// Registers a listener that receives every event of this source.
    pub fn add_catch_all<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&mut S, &E) + 'static,
    {
        self.register(None, Rc::new(listener))
    }

    fn register(&mut self, name: Option<EventName>, listener: Listener<S, E>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.registrations.push(Registration { id, name, listener });
        id
    }

    /// Returns `false` when the id was not registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        before != self.registrations.len()
    }

    pub fn listener_count(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabled sources drop events without calling any listener.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Listeners for `name`, in registration order, as of now.
    pub fn snapshot(&self, name: EventName) -> Vec<Listener<S, E>> {
        self.registrations
            .iter()
            .filter(|r| r.name.is_none_or(|n| n == name))
            .map(|r| Rc::clone(&r.listener))
            .collect()
    }

    /// Forwards matching events into a channel, for consumers that poll.
    ///
    /// The returned id removes the forwarding listener; dropping the receiver
    /// alone leaves it registered (sends to a closed channel are ignored).
    pub fn subscribe(&mut self, name: Option<EventName>) -> (ListenerId, Receiver<E>) {
        let (tx, rx) = unbounded();
        let listener: Listener<S, E> = Rc::new(move |_sender: &mut S, event: &E| {
            let _ = tx.send(event.clone());
        });
        (self.register(name, listener), rx)
    }
}

/// Implemented by types that own an [`EventSource`] and fire events from it.
pub trait EventEmitter: Sized + 'static {
    type Event: Event;

    fn event_source(&self) -> &EventSource<Self, Self::Event>;

    fn fire_event(&mut self, event: Self::Event) {
        let source = self.event_source();
        if !source.is_enabled() {
            return;
        }
        let name = event.name();
        let listeners = source.snapshot(name);
        tracing::trace!(
            target: EVENTS_TARGET,
            event = %name,
            listeners = listeners.len(),
            "dispatch"
        );
        for listener in &listeners {
            listener(self, &event);
        }
    }
}

/// Trait for components that consume queued events.
/// Implement this to drain a receiver obtained from [`EventSource::subscribe`].
pub trait EventListener<E> {
    fn handle_event(&mut self, event: &E);
}

/// Dispatch all pending events to a listener. Returns how many were handled.
pub fn dispatch_to<E, L: EventListener<E>>(receiver: &Receiver<E>, listener: &mut L) -> usize {
    let mut handled = 0;
    while let Ok(event) = receiver.try_recv() {
        listener.handle_event(&event);
        handled += 1;
    }
    handled
}
