#![forbid(unsafe_code)]

//! Error taxonomy for cells, listeners, and codecs.
//!
//! # Failure Modes
//!
//! | Failure | Raised by | Variant |
//! |---------|-----------|---------|
//! | Missing listener in composition | [`compose`](crate::listener::compose) | `InvalidArgument` |
//! | Unknown envelope type name | codec decode | `TypeResolution` |
//! | Envelope names a different registered type | typed codec decode | `TypeMismatch` |
//! | Value text does not parse | codec decode | `Serialization` |
//! | Malformed binary frame | binary codec | `Document` |
//! | Listener returned an error | [`Watchable::set`](crate::Watchable::set) | `ListenerDispatch` |
//! | `set` called from its own dispatch | [`Watchable::set`](crate::Watchable::set) | `ReentrantSet` |
//!
//! Nothing here is retried automatically: a bad type name does not start
//! resolving on a second attempt.

use std::fmt;

use crate::codec::document::DocumentError;
use crate::config::DispatchPolicy;

/// Crate-wide result alias.
pub type Result<T, E = WatchError> = std::result::Result<T, E>;

/// Boxed error produced by a pluggable value format.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error reported by a change listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    /// Create a listener error with a human-readable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message supplied by the listener.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ListenerError {}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// A single listener failure captured during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Registration index of the failing listener.
    pub index: usize,
    /// The error it returned.
    pub error: ListenerError,
}

/// Errors from cell mutation and codec operations.
#[derive(Debug)]
pub enum WatchError {
    /// A required argument was absent or unusable.
    InvalidArgument(String),
    /// An envelope's type name is not known to the registry.
    TypeResolution { type_name: String },
    /// An envelope names a registered type other than the one requested.
    TypeMismatch { expected: String, found: String },
    /// A type name is already bound to a different Rust type.
    RegistrationConflict { type_name: String },
    /// No binary codec is registered for the requested cell type.
    CodecNotFound { handled_type: String },
    /// The value format failed to render or parse a value.
    Serialization { type_name: String, source: BoxError },
    /// A binary document was malformed or the writer rejected a frame.
    Document(DocumentError),
    /// One or more listeners failed during a `set`.
    ListenerDispatch {
        policy: DispatchPolicy,
        failures: Vec<ListenerFailure>,
    },
    /// `set` was called from inside a listener of the same cell.
    ReentrantSet,
}

impl WatchError {
    pub(crate) fn serialization(type_name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Serialization {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// Listener failures carried by a `ListenerDispatch` error, empty otherwise.
    #[must_use]
    pub fn listener_failures(&self) -> &[ListenerFailure] {
        match self {
            Self::ListenerDispatch { failures, .. } => failures,
            _ => &[],
        }
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
            Self::TypeResolution { type_name } => {
                write!(f, "cannot resolve type name '{type_name}'")
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected envelope of type '{expected}', found '{found}'")
            }
            Self::RegistrationConflict { type_name } => {
                write!(f, "type name '{type_name}' is already bound to another type")
            }
            Self::CodecNotFound { handled_type } => {
                write!(f, "no codec registered for {handled_type}")
            }
            Self::Serialization { type_name, source } => {
                write!(f, "serialization of '{type_name}' failed: {source}")
            }
            Self::Document(err) => write!(f, "document error: {err}"),
            Self::ListenerDispatch { policy, failures } => {
                write!(f, "{} listener(s) failed ({policy})", failures.len())?;
                for failure in failures {
                    write!(f, "; #{}: {}", failure.index, failure.error)?;
                }
                Ok(())
            }
            Self::ReentrantSet => f.write_str("set called re-entrantly from a listener"),
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization { source, .. } => Some(source.as_ref()),
            Self::Document(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DocumentError> for WatchError {
    fn from(err: DocumentError) -> Self {
        Self::Document(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_lists_every_failure() {
        let err = WatchError::ListenerDispatch {
            policy: DispatchPolicy::ContinueAndAggregate,
            failures: vec![
                ListenerFailure {
                    index: 0,
                    error: "first".into(),
                },
                ListenerFailure {
                    index: 2,
                    error: "third".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 listener(s) failed"));
        assert!(text.contains("#0: first"));
        assert!(text.contains("#2: third"));
        assert_eq!(err.listener_failures().len(), 2);
    }

    #[test]
    fn serialization_error_exposes_source() {
        let json_err = serde_json::from_str::<i32>("nope").unwrap_err();
        let err = WatchError::serialization("i32", json_err);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("'i32'"));
    }

    #[test]
    fn non_dispatch_errors_have_no_failures() {
        let err = WatchError::TypeResolution {
            type_name: "missing::Type".into(),
        };
        assert!(err.listener_failures().is_empty());
        assert_eq!(err.to_string(), "cannot resolve type name 'missing::Type'");
    }
}
