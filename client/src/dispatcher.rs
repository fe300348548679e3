use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use shared::types::event::{EventKind, NotificationEvent};
use tracing::{debug, error};

pub type ListenerResult = anyhow::Result<()>;

type ListenerFn = dyn Fn(&NotificationEvent) -> ListenerResult + Send + Sync;

/// A registered callback. Identity is the allocation: clones of one
/// `Listener` are the same listener, two `Listener::new` calls never are.
#[derive(Clone)]
pub struct Listener(Arc<ListenerFn>);

impl Listener {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&NotificationEvent) -> ListenerResult + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn same_as(&self, other: &Listener) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    fn call(&self, event: &NotificationEvent) -> ListenerResult {
        (self.0)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0))
    }
}

/// Event name → listeners. Membership is a set: registering the same
/// listener twice under one kind delivers once.
#[derive(Clone, Default)]
pub struct Dispatcher {
    listeners: Arc<RwLock<HashMap<EventKind, Vec<Listener>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the listener was already registered for `kind`.
    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let registered = listeners.entry(kind).or_default();
        if registered.iter().any(|l| l.same_as(&listener)) {
            debug!("Listener already subscribed to {}", kind);
            return false;
        }
        registered.push(listener);
        true
    }

    /// Returns `false` when the listener was not registered for `kind`.
    pub fn unsubscribe(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let Some(registered) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|l| !l.same_as(listener));
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every listener registered for its kind, returning
    /// how many handled it cleanly.
    ///
    /// Listeners run outside the registry lock, against a snapshot taken at
    /// call time, so a listener may (un)subscribe from inside its callback. A
    /// listener that errors or panics is logged and skipped; the rest still
    /// run. With no listeners the event is dropped.
    pub(crate) fn emit(&self, event: &NotificationEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        if snapshot.is_empty() {
            debug!("No listeners for {}, dropping event", kind);
            return 0;
        }

        let mut delivered = 0;
        for listener in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.call(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => error!("{} listener failed: {:#}", kind, e),
                Err(_) => error!("{} listener panicked", kind),
            }
        }
        delivered
    }
}
