#![forbid(unsafe_code)]

//! Observable value cells with type-preserving wire forms.
//!
//! A [`Watchable<T>`] holds one value, lets callers read and replace it, and
//! calls its listeners synchronously, in registration order, whenever the
//! value is replaced. The [`codec`] module writes a cell as a `{type, value}`
//! envelope, in JSON or in a framed binary document, so the element type
//! survives a round trip even where the container type is all a reader knows.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use watchable::Watchable;
//!
//! let cell = Watchable::new(5);
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&log);
//! cell.watch(move |old: Option<&i32>, new: &i32| {
//!     sink.lock().unwrap().push((old.copied(), *new));
//! });
//!
//! cell.set(10).unwrap();
//! assert_eq!(cell.get(), Some(10));
//! assert_eq!(*log.lock().unwrap(), vec![(Some(5), 10)]);
//! ```
//!
//! # Configuration
//!
//! [`WatchableConfig::from_env`] reads `WATCHABLE_DISPATCH_POLICY` and
//! `WATCHABLE_TRACE_DISPATCH`; see [`config`].

pub mod cell;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listener;

pub use cell::Watchable;
pub use codec::{
    BinaryCodec, CellCodec, CodecRegistry, DynBinaryCodec, DynValue, Envelope, EnvelopeCodec,
    JsonValueFormat, TextCodec, TypeRegistry, ValueFormat, WireType, register_builtin_types,
    register_type,
};
pub use config::{DispatchPolicy, WatchableConfig};
pub use dispatch::Notifier;
pub use error::{ListenerError, ListenerFailure, Result, WatchError};
pub use listener::{
    AndThen, ChangeListener, FnListener, InfallibleListener, ListenerResult, SharedListener,
    compose, from_fn, infallible,
};
