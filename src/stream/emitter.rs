//! Listener registry and ordered event delivery.
//!
//! # Responsibilities
//! - Register, remove and count listeners per event kind
//! - Queue emitted events in production order
//! - Hold `data` and `end` until the stream flows; terminal events pass
//! - Deliver each event to a snapshot of its listeners
//! - Account for the bytes of undelivered data
//!
//! # Design Decisions
//! - Exactly one drain loop runs at a time; concurrent or re-entrant emitters
//!   enqueue and return, the active loop delivers their events next
//! - The flow gate is checked before every event, so pausing from inside a
//!   listener takes effect at the next event
//! - `once` registrations are removed before they are invoked
//! - The registry lock is never held while a listener runs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{BodyEvent, EventKind, Listener, ListenerId};

struct Registration {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

/// Flow mode. A stream starts in `Initial`; attaching a data listener only
/// starts an `Initial` stream, never one paused on purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Flow {
    #[default]
    Initial,
    Flowing,
    Paused,
}

#[derive(Default)]
struct EmitterState {
    listeners: HashMap<EventKind, Vec<Registration>>,
    queue: VecDeque<BodyEvent>,
    /// Bytes of `data` events in `queue`.
    buffered: usize,
    flow: Flow,
    draining: bool,
    warned: HashSet<EventKind>,
}

impl EmitterState {
    /// Snapshot the listeners for `kind`, dropping `once` registrations.
    fn take_targets(&mut self, kind: EventKind) -> Vec<Listener> {
        let Some(registrations) = self.listeners.get_mut(&kind) else {
            return Vec::new();
        };
        let targets = registrations.iter().map(|r| r.listener.clone()).collect();
        registrations.retain(|r| !r.once);
        targets
    }

    /// Pop the next event if the flow gate lets it through.
    fn next_ready(&mut self) -> Option<BodyEvent> {
        let front = self.queue.front()?;
        let held = matches!(front, BodyEvent::Data(_) | BodyEvent::End);
        if held && self.flow != Flow::Flowing {
            return None;
        }
        let event = self.queue.pop_front()?;
        if let BodyEvent::Data(chunk) = &event {
            self.buffered -= chunk.len();
        }
        Some(event)
    }
}

/// Per-stream listener registry with an ordered delivery queue.
pub struct EventEmitter {
    state: Mutex<EmitterState>,
    next_id: AtomicU64,
    max_listeners: usize,
}

impl EventEmitter {
    /// Create an emitter. `max_listeners` of 0 disables the leak warning.
    pub fn new(max_listeners: usize) -> Self {
        Self {
            state: Mutex::new(EmitterState::default()),
            next_id: AtomicU64::new(1),
            max_listeners,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EmitterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener for `kind`.
    pub fn register(&self, kind: EventKind, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.lock();
        let registrations = state.listeners.entry(kind).or_default();
        registrations.push(Registration { id, once, listener });
        let count = registrations.len();

        if self.max_listeners > 0 && count > self.max_listeners && state.warned.insert(kind) {
            tracing::warn!(
                event = %kind,
                count,
                max_listeners = self.max_listeners,
                "Possible listener leak detected"
            );
        }
        id
    }

    /// Remove a registration. Returns false if no such registration exists.
    pub fn remove(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut state = self.lock();
        match state.listeners.get_mut(&kind) {
            Some(registrations) => {
                let before = registrations.len();
                registrations.retain(|r| r.id != id);
                registrations.len() != before
            }
            None => false,
        }
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Switch to flowing mode. Returns true if the emitter was not flowing.
    pub fn resume(&self) -> bool {
        let mut state = self.lock();
        std::mem::replace(&mut state.flow, Flow::Flowing) != Flow::Flowing
    }

    /// Start flowing unless the stream was explicitly paused.
    /// Returns true if the emitter switched to flowing.
    pub fn start(&self) -> bool {
        let mut state = self.lock();
        if state.flow == Flow::Initial {
            state.flow = Flow::Flowing;
            true
        } else {
            false
        }
    }

    /// Stop delivering `data` and `end` until the next `resume`.
    pub fn pause(&self) {
        self.lock().flow = Flow::Paused;
    }

    pub fn is_flowing(&self) -> bool {
        self.lock().flow == Flow::Flowing
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Bytes of data waiting for delivery.
    pub fn buffered_bytes(&self) -> usize {
        self.lock().buffered
    }

    /// Append an event to the delivery queue.
    pub fn enqueue(&self, event: BodyEvent) {
        let mut state = self.lock();
        if let BodyEvent::Data(chunk) = &event {
            state.buffered += chunk.len();
        }
        state.queue.push_back(event);
    }

    /// Drop every undelivered `data` event. Returns the number of bytes dropped.
    pub fn discard_data(&self) -> usize {
        let mut state = self.lock();
        state.queue.retain(|event| !matches!(event, BodyEvent::Data(_)));
        std::mem::take(&mut state.buffered)
    }

    /// Deliver queued events until the queue is empty or the next event is
    /// held by the flow gate.
    ///
    /// Returns immediately if another drain loop is active. `delivered` runs
    /// after each event's listeners.
    pub fn drain(&self, delivered: impl Fn(&BodyEvent)) {
        {
            let mut state = self.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let _guard = DrainGuard { emitter: self };

        loop {
            let (event, targets) = {
                let mut state = self.lock();
                match state.next_ready() {
                    Some(event) => {
                        let targets = state.take_targets(event.kind());
                        (event, targets)
                    }
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            for listener in &targets {
                listener(&event);
            }
            delivered(&event);
        }
    }
}

/// Clears the draining flag if a listener unwinds mid-delivery.
struct DrainGuard<'a> {
    emitter: &'a EventEmitter,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.emitter.lock().draining = false;
        }
    }
}
