//! Hierarchical typed value container.
//!
//! # Data Flow
//! ```text
//! Key<T> + ValueSource (constant / provider / alias / adapter)
//!     → bind() into a MutableValues scope (type checked)
//!
//! value(key) on a leaf:
//!     RootValues:   local lookup
//!     ChildValues:  local lookup → parent.value_source(key) → ... → root
//!     CachedValues: memo hit → wrapped.value_source(key) → evaluate → memo
//!     the source is always evaluated against the leaf that was asked
//! ```
//!
//! # Design Decisions
//! - Lookup misses are `None`, never errors; aliases to a missing key panic
//! - Binding only ever touches the local scope, never an ancestor
//! - Cached views never invalidate: a resolved key stays resolved

pub mod container;
pub mod key;
pub mod source;

use std::sync::Arc;

pub use container::{CachedValues, ChildValues, RootValues};
pub use key::{int64_at, string_at, AnyKey, Key};
pub use source::{Value, ValueSource};

/// Read-only resolution surface.
pub trait Values: Send + Sync {
    /// Scope path, for diagnostics.
    fn path(&self) -> String;

    /// Locate the source bound to `key`, searching outwards from this scope.
    fn value_source(&self, key: &AnyKey) -> Option<ValueSource>;

    /// Resolve `key` as seen from this scope.
    fn value(&self, key: &AnyKey) -> Option<Value>;
}

/// A scope that accepts bindings.
pub trait MutableValues: Values {
    /// Bind `source` to `key` in this scope.
    ///
    /// Returns `false`, leaving the scope unchanged, when the source's declared
    /// type is not the key's declared type.
    fn bind(&self, key: &AnyKey, source: ValueSource) -> bool;

    /// Like [`bind`](MutableValues::bind), but a type mismatch panics.
    fn must_bind(&self, key: &AnyKey, source: ValueSource) {
        let described = format!("{:?}", source);
        if !self.bind(key, source) {
            panic!("unable to bind {:?} to {}, type mismatch?", key, described);
        }
    }
}

impl<V: Values + ?Sized> Values for Arc<V> {
    fn path(&self) -> String {
        (**self).path()
    }

    fn value_source(&self, key: &AnyKey) -> Option<ValueSource> {
        (**self).value_source(key)
    }

    fn value(&self, key: &AnyKey) -> Option<Value> {
        (**self).value(key)
    }
}

impl<V: MutableValues + ?Sized> MutableValues for Arc<V> {
    fn bind(&self, key: &AnyKey, source: ValueSource) -> bool {
        (**self).bind(key, source)
    }
}
