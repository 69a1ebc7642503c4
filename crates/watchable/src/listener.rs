#![forbid(unsafe_code)]

//! Change listeners and listener composition.
//!
//! A listener is anything implementing [`ChangeListener<T>`]: one method,
//! invoked with the previous value (absent when the cell was empty) and the
//! new value. Closures become listeners through [`from_fn`] (fallible) or
//! [`infallible`].
//!
//! # Composition
//!
//! [`ChangeListener::and_then`] wraps two listeners in an [`AndThen`] value
//! that runs the first, then the second, with the same `(old, new)` pair.
//! When the first listener fails the second is not run and the first error is
//! returned, so a composed listener counts as a single unit during dispatch.
//! [`compose`] is the dynamic form for optional, type-erased slots and rejects
//! a missing second listener with
//! [`WatchError::InvalidArgument`](crate::WatchError::InvalidArgument).

use std::fmt;
use std::sync::Arc;

use crate::error::{ListenerError, Result, WatchError};

/// Outcome of a single listener invocation.
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Type-erased, shareable listener as stored by a cell.
pub type SharedListener<T> = Arc<dyn ChangeListener<T>>;

/// Observer of value changes.
pub trait ChangeListener<T>: Send + Sync {
    /// Called after the cell's value has been replaced.
    fn on_change(&self, old: Option<&T>, new: &T) -> ListenerResult;

    /// Chain `next` after this listener.
    fn and_then<L>(self, next: L) -> AndThen<Self, L>
    where
        Self: Sized,
        L: ChangeListener<T>,
    {
        AndThen {
            first: self,
            second: next,
        }
    }
}

impl<T, L> ChangeListener<T> for Arc<L>
where
    L: ChangeListener<T> + ?Sized,
{
    fn on_change(&self, old: Option<&T>, new: &T) -> ListenerResult {
        (**self).on_change(old, new)
    }
}

impl<T, L> ChangeListener<T> for Box<L>
where
    L: ChangeListener<T> + ?Sized,
{
    fn on_change(&self, old: Option<&T>, new: &T) -> ListenerResult {
        (**self).on_change(old, new)
    }
}

/// Listener backed by a closure returning [`ListenerResult`].
#[derive(Clone)]
pub struct FnListener<F> {
    f: F,
}

impl<F> fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").finish_non_exhaustive()
    }
}

impl<T, F> ChangeListener<T> for FnListener<F>
where
    F: Fn(Option<&T>, &T) -> ListenerResult + Send + Sync,
{
    fn on_change(&self, old: Option<&T>, new: &T) -> ListenerResult {
        (self.f)(old, new)
    }
}

/// Wrap a fallible closure as a listener.
pub fn from_fn<T, F>(f: F) -> FnListener<F>
where
    F: Fn(Option<&T>, &T) -> ListenerResult + Send + Sync,
{
    FnListener { f }
}

/// Listener backed by a closure that cannot fail.
#[derive(Clone)]
pub struct InfallibleListener<F> {
    f: F,
}

impl<F> fmt::Debug for InfallibleListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfallibleListener").finish_non_exhaustive()
    }
}

impl<T, F> ChangeListener<T> for InfallibleListener<F>
where
    F: Fn(Option<&T>, &T) + Send + Sync,
{
    fn on_change(&self, old: Option<&T>, new: &T) -> ListenerResult {
        (self.f)(old, new);
        Ok(())
    }
}

/// Wrap an infallible closure as a listener.
pub fn infallible<T, F>(f: F) -> InfallibleListener<F>
where
    F: Fn(Option<&T>, &T) + Send + Sync,
{
    InfallibleListener { f }
}

/// Two listeners run in sequence. Built by [`ChangeListener::and_then`].
#[derive(Debug, Clone)]
pub struct AndThen<A, B> {
    first: A,
    second: B,
}

impl<A, B> AndThen<A, B> {
    /// Split back into the two wrapped listeners.
    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<T, A, B> ChangeListener<T> for AndThen<A, B>
where
    A: ChangeListener<T>,
    B: ChangeListener<T>,
{
    fn on_change(&self, old: Option<&T>, new: &T) -> ListenerResult {
        self.first.on_change(old, new)?;
        self.second.on_change(old, new)
    }
}

/// Compose two shared listeners, failing when `second` is absent.
pub fn compose<T: 'static>(
    first: SharedListener<T>,
    second: Option<SharedListener<T>>,
) -> Result<SharedListener<T>> {
    let second = second.ok_or_else(|| {
        WatchError::InvalidArgument("second listener of a composition is absent".into())
    })?;
    Ok(Arc::new(first.and_then(second)))
}
