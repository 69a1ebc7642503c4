#![forbid(unsafe_code)]

//! Name → type resolution for envelope decoding.
//!
//! # Invariants
//!
//! 1. A name is bound to at most one Rust type, and a Rust type to at most
//!    one name.
//! 2. Registration is idempotent: registering the same type again returns
//!    the existing descriptor.
//! 3. The reserved empty-cell marker name can never be registered.
//! 4. Lookups take a shared lock only, so concurrent decodes never block
//!    each other; a failed lookup leaves the registry untouched.
//!
//! A process-wide registry for the default [`JsonValueFormat`] is available
//! through [`registry()`]. It starts empty; call
//! [`register_builtin_types`] (idempotent) during start-up to bind the
//! primitive types, `String`, and `Vec<String>`.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::debug;

use super::envelope::NONE_TYPE_NAME;
use super::format::{JsonValueFormat, ValueFormat};
use super::wire_type::{DynValue, WireType};
use crate::error::{Result, WatchError};

type ParseFn<F> = fn(&F, &str) -> Result<DynValue>;
type RenderFn<F> = fn(&F, &DynValue) -> Result<String>;

/// Everything the codecs need to handle one registered type.
pub struct TypeDescriptor<F = JsonValueFormat> {
    name: String,
    type_id: TypeId,
    rust_type: &'static str,
    parse: ParseFn<F>,
    render: RenderFn<F>,
}

impl<F> fmt::Debug for TypeDescriptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("rust_type", &self.rust_type)
            .finish_non_exhaustive()
    }
}

impl<F: ValueFormat> TypeDescriptor<F> {
    fn of<T: WireType>() -> Self {
        Self {
            name: T::wire_name().into_owned(),
            type_id: TypeId::of::<T>(),
            rust_type: std::any::type_name::<T>(),
            parse: parse_erased::<T, F>,
            render: render_erased::<T, F>,
        }
    }

    /// Registered wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `TypeId` of the bound Rust type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Compiler-provided name of the bound Rust type (diagnostics only).
    #[must_use]
    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }

    /// Whether this descriptor is bound to `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Parse envelope text into an erased value of the bound type.
    ///
    /// # Errors
    ///
    /// [`WatchError::Serialization`] when the text does not parse.
    pub fn parse(&self, format: &F, text: &str) -> Result<DynValue> {
        (self.parse)(format, text)
    }

    /// Render an erased value of the bound type.
    ///
    /// # Errors
    ///
    /// [`WatchError::TypeMismatch`] when `value` holds another type,
    /// [`WatchError::Serialization`] when rendering fails.
    pub fn render(&self, format: &F, value: &DynValue) -> Result<String> {
        (self.render)(format, value)
    }
}

fn parse_erased<T: WireType, F: ValueFormat>(format: &F, text: &str) -> Result<DynValue> {
    format
        .parse::<T>(text)
        .map(DynValue::new)
        .map_err(|err| WatchError::serialization(T::wire_name(), err))
}

fn render_erased<T: WireType, F: ValueFormat>(format: &F, value: &DynValue) -> Result<String> {
    let typed = value
        .downcast_ref::<T>()
        .ok_or_else(|| WatchError::TypeMismatch {
            expected: T::wire_name().into_owned(),
            found: value.wire_name().into_owned(),
        })?;
    format
        .render(typed)
        .map_err(|err| WatchError::serialization(T::wire_name(), err))
}

struct RegistryInner<F> {
    by_name: HashMap<String, Arc<TypeDescriptor<F>>>,
    by_type: HashMap<TypeId, Arc<TypeDescriptor<F>>>,
}

/// Thread-safe map from wire names to [`TypeDescriptor`]s.
pub struct TypeRegistry<F = JsonValueFormat> {
    inner: RwLock<RegistryInner<F>>,
}

impl<F> fmt::Debug for TypeRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let mut names: Vec<&str> = inner.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

impl<F: ValueFormat> Default for TypeRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ValueFormat> TypeRegistry<F> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_name: HashMap::new(),
                by_type: HashMap::new(),
            }),
        }
    }

    /// Create a registry with the built-in types already bound.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Bind `T` under its wire name.
    ///
    /// # Errors
    ///
    /// [`WatchError::InvalidArgument`] for the reserved empty-cell name,
    /// [`WatchError::RegistrationConflict`] when the name or the type is
    /// already bound to something else.
    pub fn register<T: WireType>(&self) -> Result<Arc<TypeDescriptor<F>>> {
        let descriptor = TypeDescriptor::<F>::of::<T>();
        if descriptor.name == NONE_TYPE_NAME {
            return Err(WatchError::InvalidArgument(format!(
                "type name '{NONE_TYPE_NAME}' is reserved for empty cells"
            )));
        }

        let mut inner = self.inner.write();
        if let Some(existing) = inner.by_name.get(&descriptor.name) {
            if existing.type_id == descriptor.type_id {
                return Ok(Arc::clone(existing));
            }
            return Err(WatchError::RegistrationConflict {
                type_name: descriptor.name,
            });
        }
        if let Some(existing) = inner.by_type.get(&descriptor.type_id) {
            return Err(WatchError::RegistrationConflict {
                type_name: existing.name.clone(),
            });
        }

        debug!(
            type_name = %descriptor.name,
            rust_type = descriptor.rust_type,
            "registered wire type"
        );
        let descriptor = Arc::new(descriptor);
        inner
            .by_name
            .insert(descriptor.name.clone(), Arc::clone(&descriptor));
        inner
            .by_type
            .insert(descriptor.type_id, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Bind the primitive types, `String`, and `Vec<String>`.
    ///
    /// Idempotent. Built-in names cannot conflict with each other, so this
    /// only fails if a caller bound one of those names to a custom type first;
    /// such names are skipped and logged.
    pub fn register_builtins(&self) {
        let results = [
            self.register::<bool>().map(drop),
            self.register::<char>().map(drop),
            self.register::<i8>().map(drop),
            self.register::<i16>().map(drop),
            self.register::<i32>().map(drop),
            self.register::<i64>().map(drop),
            self.register::<u8>().map(drop),
            self.register::<u16>().map(drop),
            self.register::<u32>().map(drop),
            self.register::<u64>().map(drop),
            self.register::<f32>().map(drop),
            self.register::<f64>().map(drop),
            self.register::<String>().map(drop),
            self.register::<Vec<String>>().map(drop),
        ];
        for err in results.into_iter().filter_map(std::result::Result::err) {
            debug!(%err, "skipped built-in wire type");
        }
    }

    /// Resolve a wire name.
    ///
    /// # Errors
    ///
    /// [`WatchError::TypeResolution`] when the name is unknown.
    pub fn resolve(&self, name: &str) -> Result<Arc<TypeDescriptor<F>>> {
        self.inner
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| WatchError::TypeResolution {
                type_name: name.to_string(),
            })
    }

    /// Descriptor bound to the Rust type with `type_id`, if any.
    #[must_use]
    pub fn descriptor_for(&self, type_id: TypeId) -> Option<Arc<TypeDescriptor<F>>> {
        self.inner.read().by_type.get(&type_id).cloned()
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().by_name.contains_key(name)
    }

    /// Number of bound types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    /// Whether no type is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().by_name.is_empty()
    }

    /// Bound names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().by_name.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

/// Process-wide registry used by the serde integration and default codecs.
pub fn registry() -> &'static TypeRegistry {
    static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(TypeRegistry::new)
}

/// Bind the built-in types in the process-wide registry. Idempotent.
pub fn register_builtin_types() {
    registry().register_builtins();
}

/// Bind `T` in the process-wide registry.
///
/// # Errors
///
/// See [`TypeRegistry::register`].
pub fn register_type<T: WireType>() -> Result<()> {
    registry().register::<T>().map(drop)
}
