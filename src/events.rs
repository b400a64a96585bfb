//! Per-benchmark event listeners.

use crate::benchmark::Benchmark;
use std::collections::HashMap;
use std::ops::ControlFlow;

/// Lifecycle events a benchmark emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    /// After every measured cycle; a `Break` from a listener aborts.
    Cycle,
    Complete,
    Error,
    Reset,
    Abort,
}

/// Handle returned by [`Benchmark::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Box<dyn FnMut(&Benchmark) -> ControlFlow<()> + Send>;

#[derive(Default)]
pub(crate) struct EventBus {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        list.len() != before
    }

    pub(crate) fn clear(&mut self, kind: EventKind) {
        self.listeners.remove(&kind);
    }

    pub(crate) fn len(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Detach the listeners of `kind` for the duration of an emission.
    pub(crate) fn take(&mut self, kind: EventKind) -> Vec<(ListenerId, Listener)> {
        self.listeners.remove(&kind).unwrap_or_default()
    }

    /// Put detached listeners back ahead of any registered meanwhile.
    pub(crate) fn restore(&mut self, kind: EventKind, mut detached: Vec<(ListenerId, Listener)>) {
        if let Some(added) = self.listeners.remove(&kind) {
            detached.extend(added);
        }
        if !detached.is_empty() {
            self.listeners.insert(kind, detached);
        }
    }
}

impl Benchmark {
    /// Register a listener. Returning `ControlFlow::Break` stops later
    /// listeners of the same emission.
    pub fn on<L>(&mut self, kind: EventKind, listener: L) -> ListenerId
    where
        L: FnMut(&Benchmark) -> ControlFlow<()> + Send + 'static,
    {
        self.events.add(kind, Box::new(listener))
    }

    /// Register a listener that never vetoes.
    pub fn observe<L>(&mut self, kind: EventKind, mut listener: L) -> ListenerId
    where
        L: FnMut(&Benchmark) + Send + 'static,
    {
        self.on(kind, move |bench| {
            listener(bench);
            ControlFlow::Continue(())
        })
    }

    pub fn off(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.events.remove(kind, id)
    }

    pub fn off_all(&mut self, kind: EventKind) {
        self.events.clear(kind);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.events.len(kind)
    }

    /// Run the listeners of `kind` in registration order. Returns `false`
    /// when one of them broke off.
    pub(crate) fn emit(&mut self, kind: EventKind) -> bool {
        let mut listeners = self.events.take(kind);
        let mut proceed = true;
        for (_, listener) in listeners.iter_mut() {
            if listener(&*self).is_break() {
                proceed = false;
                break;
            }
        }
        self.events.restore(kind, listeners);
        proceed
    }
}
