#![forbid(unsafe_code)]

//! Observable value cell with synchronous change notification.
//!
//! # Design
//!
//! [`Watchable<T>`] keeps an optional value of type `T` and an ordered list of
//! listeners in shared, reference-counted storage (`Arc`). Cloning a handle
//! shares both. Every `set` replaces the value and then invokes each listener,
//! in registration order, with the previous and the new value.
//!
//! # Concurrency
//!
//! `get` and `set` may be called from any thread. `set` calls are serialized:
//! the read-old/write-new/dispatch sequence of one `set` never interleaves with
//! another. Readers see either the value before or after a `set`, never a
//! partial write. Dispatch runs on the thread that called `set` and `set`
//! returns only after every listener has run.
//!
//! | Operation        | Complexity                 |
//! |------------------|----------------------------|
//! | `get()`          | O(1) + clone of `T`        |
//! | `set()`          | O(L) where L = listeners   |
//! | `watch()`        | O(1) amortized             |
//!
//! # Failure Modes
//!
//! - **Re-entrant set**: calling `set` on a cell from inside one of its own
//!   listeners returns [`WatchError::ReentrantSet`] and leaves the value as
//!   the outer `set` wrote it.
//! - **Listener failure**: reported as [`WatchError::ListenerDispatch`] after
//!   the value has been replaced; the configured
//!   [`DispatchPolicy`](crate::DispatchPolicy) decides whether the remaining
//!   listeners run.
//! - **`with` + `set` on one thread**: `with` holds the read lock while its
//!   closure runs; calling `set` inside that closure deadlocks.

use std::cell::Cell;
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::trace;

use crate::config::WatchableConfig;
use crate::dispatch::{Notifier, dispatch};
use crate::error::{ListenerError, Result, WatchError};
use crate::listener::{ChangeListener, SharedListener, from_fn, infallible};

struct Slot<T> {
    value: Option<T>,
    version: u64,
}

struct Shared<T> {
    slot: RwLock<Slot<T>>,
    notifier: Notifier<T>,
    config: WatchableConfig,
    /// Serializes `set`; the flag is raised while this thread dispatches.
    set_guard: ReentrantMutex<Cell<bool>>,
}

/// Lowers the dispatch flag when the `set` that raised it ends, panics included.
struct DispatchScope<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> DispatchScope<'a> {
    fn enter(flag: &'a Cell<bool>) -> Result<Self> {
        if flag.replace(true) {
            return Err(WatchError::ReentrantSet);
        }
        Ok(Self { flag })
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// A shared, observable single-value container.
///
/// # Invariants
///
/// 1. The cell holds at most one value; `get` returns the initial value or
///    the value of the last completed `set`.
/// 2. `version` increases by exactly 1 per applied mutation.
/// 3. Listeners are invoked in registration order, once per registration.
/// 4. Listeners are never part of the cell's wire form.
pub struct Watchable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Watchable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Watchable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.shared.slot.read();
        f.debug_struct("Watchable")
            .field("value", &slot.value)
            .field("version", &slot.version)
            .field("listener_count", &self.shared.notifier.len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Watchable<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Clone + Send + Sync + 'static> From<T> for Watchable<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Clone + Send + Sync + 'static> Watchable<T> {
    /// Create a cell holding `value`, with default configuration.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_config(Some(value), WatchableConfig::default())
    }

    /// Alias for [`Watchable::new`].
    #[must_use]
    pub fn of(value: T) -> Self {
        Self::new(value)
    }

    /// Create a cell without a value.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_config(None, WatchableConfig::default())
    }

    /// Create a cell with an optional initial value and explicit configuration.
    #[must_use]
    pub fn with_config(initial: Option<T>, config: WatchableConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: RwLock::new(Slot {
                    value: initial,
                    version: 0,
                }),
                notifier: Notifier::new(),
                config,
                set_guard: ReentrantMutex::new(Cell::new(false)),
            }),
        }
    }

    /// Clone of the current value, `None` for an empty cell.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.shared.slot.read().value.clone()
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.shared.slot.read().value.as_ref())
    }

    /// Whether the cell currently holds no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.slot.read().value.is_none()
    }

    /// Replace the value and notify every listener with `(previous, value)`.
    ///
    /// The value is replaced even when listeners fail; failures are returned
    /// as [`WatchError::ListenerDispatch`] according to the configured policy.
    ///
    /// # Errors
    ///
    /// [`WatchError::ReentrantSet`] when called from one of this cell's
    /// listeners, [`WatchError::ListenerDispatch`] when listeners fail.
    pub fn set(&self, value: T) -> Result<()> {
        let guard = self.shared.set_guard.lock();
        let _scope = DispatchScope::enter(&guard)?;
        let old = self.replace(value.clone());
        self.dispatch(old.as_ref(), &value)
    }

    /// Modify the value in place, then notify with the previous and updated
    /// value. Returns `Ok(false)` without calling `f` when the cell is empty.
    ///
    /// `f` runs under the write lock and must not touch this cell.
    ///
    /// # Errors
    ///
    /// Same as [`Watchable::set`].
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<bool> {
        let guard = self.shared.set_guard.lock();
        let _scope = DispatchScope::enter(&guard)?;
        let (old, new) = {
            let mut slot = self.shared.slot.write();
            let Some(current) = slot.value.as_mut() else {
                return Ok(false);
            };
            let old = current.clone();
            f(current);
            let new = current.clone();
            slot.version += 1;
            (old, new)
        };
        self.dispatch(Some(&old), &new)?;
        Ok(true)
    }

    /// Register a listener that cannot fail.
    pub fn watch<F>(&self, f: F)
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        self.watch_listener(infallible(f));
    }

    /// Register a fallible listener closure.
    pub fn try_watch<F>(&self, f: F)
    where
        F: Fn(Option<&T>, &T) -> std::result::Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.watch_listener(from_fn(f));
    }

    /// Register any [`ChangeListener`] implementation.
    pub fn watch_listener<L>(&self, listener: L)
    where
        L: ChangeListener<T> + 'static,
    {
        self.watch_shared(Arc::new(listener));
    }

    /// Register an already shared listener.
    pub fn watch_shared(&self, listener: SharedListener<T>) {
        self.shared.notifier.register(listener);
    }

    /// Number of applied mutations since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.shared.slot.read().version
    }

    /// Number of registered listeners, duplicates included.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.notifier.len()
    }

    /// The configuration this cell was built with.
    #[must_use]
    pub fn config(&self) -> WatchableConfig {
        self.shared.config
    }

    fn replace(&self, value: T) -> Option<T> {
        let mut slot = self.shared.slot.write();
        slot.version += 1;
        slot.value.replace(value)
    }

    fn dispatch(&self, old: Option<&T>, new: &T) -> Result<()> {
        let listeners = self.shared.notifier.snapshot();
        if listeners.is_empty() {
            return Ok(());
        }
        let config = self.shared.config;
        trace!(
            listeners = listeners.len(),
            policy = %config.dispatch_policy,
            "dispatching value change"
        );
        dispatch(
            &listeners,
            old,
            new,
            config.dispatch_policy,
            config.trace_dispatch,
        )
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Watchable<T> {
    /// Like [`Watchable::set`], but a no-op (no version bump, no
    /// notification) when `value` equals the current value.
    ///
    /// Returns whether the value was replaced.
    ///
    /// # Errors
    ///
    /// Same as [`Watchable::set`].
    pub fn set_if_changed(&self, value: T) -> Result<bool> {
        let guard = self.shared.set_guard.lock();
        let _scope = DispatchScope::enter(&guard)?;
        if self.shared.slot.read().value.as_ref() == Some(&value) {
            return Ok(false);
        }
        let old = self.replace(value.clone());
        self.dispatch(old.as_ref(), &value)?;
        Ok(true)
    }
}
