#![forbid(unsafe_code)]

//! Ordered listener list and the multicast rule.
//!
//! # Invariants
//!
//! 1. Listeners are invoked in registration order.
//! 2. A dispatch works on a snapshot taken when it starts: listeners added
//!    while it runs are first invoked by the next dispatch.
//! 3. Every failure is reported. Under
//!    [`DispatchPolicy::ContinueAndAggregate`] all listeners run and all
//!    failures are collected; under [`DispatchPolicy::FailFast`] the first
//!    failure ends the dispatch.
//!
//! # Failure Modes
//!
//! - **Listener panics**: the panic unwinds through `notify` to the caller of
//!   `set`. The cell's value has already been replaced at that point.

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::config::DispatchPolicy;
use crate::error::{ListenerFailure, Result, WatchError};
use crate::listener::SharedListener;

/// Ordered, append-only collection of listeners.
pub struct Notifier<T> {
    listeners: RwLock<Vec<SharedListener<T>>>,
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T> std::fmt::Debug for Notifier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listener_count", &self.len())
            .finish()
    }
}

impl<T> Notifier<T> {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Duplicates are kept and invoked once each.
    pub fn register(&self, listener: SharedListener<T>) {
        self.listeners.write().push(listener);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Clone the current listener handles.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SharedListener<T>> {
        self.listeners.read().clone()
    }

    /// Snapshot the listeners and invoke them with `(old, new)`.
    ///
    /// The internal lock is released before any listener runs, so listeners
    /// may register further listeners.
    pub fn notify(&self, old: Option<&T>, new: &T, policy: DispatchPolicy) -> Result<()> {
        let listeners = self.snapshot();
        dispatch(&listeners, old, new, policy, false)
    }
}

/// Invoke `listeners` in order under `policy`.
pub(crate) fn dispatch<T>(
    listeners: &[SharedListener<T>],
    old: Option<&T>,
    new: &T,
    policy: DispatchPolicy,
    trace_each: bool,
) -> Result<()> {
    let mut failures = Vec::new();
    for (index, listener) in listeners.iter().enumerate() {
        if trace_each {
            trace!(listener = index, "invoking change listener");
        }
        if let Err(error) = listener.on_change(old, new) {
            warn!(listener = index, %policy, %error, "change listener failed");
            failures.push(ListenerFailure { index, error });
            if policy == DispatchPolicy::FailFast {
                break;
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(WatchError::ListenerDispatch { policy, failures })
    }
}
