//! Typed, identity-compared keys.
//!
//! # Responsibilities
//! - Carry a human-readable address for diagnostics
//! - Carry the declared value type used to check bindings
//! - Compare by identity: two keys created with the same address are distinct
//!
//! # Design Decisions
//! - `Key<T>` fixes the value type at compile time; `AnyKey` is the erased view
//!   the containers store and compare
//! - Keys are cheap to clone (shared inner) and usually live in a `static`

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::values::Values;

struct KeyInner {
    address: String,
    value_type: TypeId,
    type_name: &'static str,
}

/// Erased view of a key: address, declared value type and identity.
#[derive(Clone)]
pub struct AnyKey {
    inner: Arc<KeyInner>,
}

impl AnyKey {
    fn new<T: Any>(address: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(KeyInner {
                address: address.into(),
                value_type: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    /// Human-readable address, for diagnostics only.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Declared value type of the key.
    pub fn value_type(&self) -> TypeId {
        self.inner.value_type
    }

    /// Name of the declared value type.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }
}

impl PartialEq for AnyKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for AnyKey {}

impl Hash for AnyKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for AnyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}: {})", self.inner.address, self.inner.type_name)
    }
}

/// A key whose bound values must be of type `T`.
pub struct Key<T> {
    erased: AnyKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> Key<T> {
    /// Create a new key. Every call yields a distinct key, even for equal addresses.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            erased: AnyKey::new::<T>(address),
            _marker: PhantomData,
        }
    }

    /// Resolve this key in `values` and downcast the result.
    ///
    /// Returns `None` when the key is unbound. A bound value of another type
    /// cannot happen, since bindings are type checked.
    pub fn value(&self, values: &dyn Values) -> Option<Arc<T>> {
        values.value(&self.erased)?.downcast::<T>().ok()
    }

    /// The erased view of this key.
    pub fn erased(&self) -> &AnyKey {
        &self.erased
    }
}

impl<T: Any + Send + Sync + Clone> Key<T> {
    /// Resolve and clone the value out of its shared wrapper.
    pub fn cloned(&self, values: &dyn Values) -> Option<T> {
        self.value(values).map(|v| T::clone(&v))
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Deref for Key<T> {
    type Target = AnyKey;

    fn deref(&self) -> &AnyKey {
        &self.erased
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.erased.fmt(f)
    }
}

/// Shorthand for a `String` key.
pub fn string_at(address: &str) -> Key<String> {
    Key::new(address)
}

/// Shorthand for an `i64` key.
pub fn int64_at(address: &str) -> Key<i64> {
    Key::new(address)
}
