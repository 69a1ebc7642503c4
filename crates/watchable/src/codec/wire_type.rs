#![forbid(unsafe_code)]

//! Named value types and the type-erased [`DynValue`].
//!
//! A [`WireType`] is a value type with a stable, fully-qualified name. The
//! name is what an envelope records in its `type` field; the registry maps it
//! back to the Rust type at decode time.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A value type that can travel inside an envelope.
///
/// Implementations must return the same name on every call and across
/// processes that exchange envelopes.
pub trait WireType:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Fully-qualified name written to the envelope's `type` field.
    fn wire_name() -> Cow<'static, str>;
}

macro_rules! impl_wire_type {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl WireType for $ty {
                fn wire_name() -> Cow<'static, str> {
                    Cow::Borrowed($name)
                }
            }
        )*
    };
}

impl_wire_type! {
    bool => "bool",
    char => "char",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    f32 => "f32",
    f64 => "f64",
    String => "std::string::String",
}

impl<T: WireType> WireType for Vec<T> {
    fn wire_name() -> Cow<'static, str> {
        Cow::Owned(format!("std::vec::Vec<{}>", T::wire_name()))
    }
}

/// Object-safe view of a [`WireType`] value.
trait ErasedValue: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn eq_erased(&self, other: &dyn ErasedValue) -> bool;
    fn debug_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn erased_wire_name(&self) -> Cow<'static, str>;
}

impl<T: WireType> ErasedValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_erased(&self, other: &dyn ErasedValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn debug_erased(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn erased_wire_name(&self) -> Cow<'static, str> {
        <T as WireType>::wire_name()
    }
}

/// A value whose concrete type is known only at runtime.
///
/// `Watchable<DynValue>` is what an envelope decodes to when the caller does
/// not name the element type statically. Two `DynValue`s are equal when they
/// hold the same concrete type and equal values.
#[derive(Clone)]
pub struct DynValue {
    inner: Arc<dyn ErasedValue>,
}

impl DynValue {
    /// Erase `value`.
    pub fn new<T: WireType>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Wire name of the held value's type.
    #[must_use]
    pub fn wire_name(&self) -> Cow<'static, str> {
        self.inner.erased_wire_name()
    }

    /// `TypeId` of the held value.
    #[must_use]
    pub fn value_type_id(&self) -> TypeId {
        self.inner.as_any().type_id()
    }

    /// Whether the held value is a `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    /// Borrow the held value as a `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Clone the held value out as a `T`.
    #[must_use]
    pub fn downcast<T: Clone + 'static>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl PartialEq for DynValue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq_erased(other.inner.as_ref())
    }
}

impl fmt::Debug for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.debug_erased(f)
    }
}
