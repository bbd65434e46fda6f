//! Routes inbound frames to listeners registered per message kind.
//!
//! Listeners run in registration order. A listener that returns an error
//! or panics is logged and skipped; it never stops delivery to the
//! listeners after it, and never reaches the socket task.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use super::frames::{InboundFrame, MessageKind};

type Handler = Arc<dyn Fn(&InboundFrame) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<MessageKind, Vec<(u64, Handler)>>,
}

impl Registry {
    fn remove(&mut self, kind: &MessageKind, id: u64) -> bool {
        let Some(handlers) = self.listeners.get_mut(kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.listeners.remove(kind);
        }
        removed
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cheap-clone handle to a shared listener registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
}

/// Returned by [`Dispatcher::on`]; removes exactly that listener.
#[derive(Debug)]
pub struct ListenerHandle {
    kind: MessageKind,
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl ListenerHandle {
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Remove the listener. Returns false if it was already gone.
    pub fn unregister(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock(&registry).remove(&self.kind, self.id),
            None => false,
        }
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for frames of `kind`.
    pub fn on<F>(&self, kind: MessageKind, handler: F) -> ListenerHandle
    where
        F: Fn(&InboundFrame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .listeners
            .entry(kind.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        ListenerHandle {
            kind,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn off(&self, handle: &ListenerHandle) -> bool {
        lock(&self.registry).remove(&handle.kind, handle.id)
    }

    pub fn listener_count(&self, kind: &MessageKind) -> usize {
        lock(&self.registry).listeners.get(kind).map_or(0, Vec::len)
    }

    /// Deliver `frame` to every listener for its kind. Returns how many
    /// listeners completed without error.
    pub fn dispatch(&self, frame: &InboundFrame) -> usize {
        // Snapshot so listeners can register/unregister while being called.
        let handlers: Vec<Handler> = match lock(&self.registry).listeners.get(&frame.kind) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(frame))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    debug!(kind = %frame.kind, error = %e, "Listener failed");
                }
                Err(_) => {
                    debug!(kind = %frame.kind, "Listener panicked");
                }
            }
        }
        delivered
    }
}
