//! Root, child and cached containers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::values::key::AnyKey;
use crate::values::source::{Value, ValueSource};
use crate::values::{MutableValues, Values};

/// A flat key → source mapping, shared by root and child scopes.
#[derive(Default)]
struct Bindings {
    sources: RwLock<HashMap<AnyKey, ValueSource>>,
}

impl Bindings {
    fn get(&self, key: &AnyKey) -> Option<ValueSource> {
        self.sources
            .read()
            .expect("values bindings lock poisoned")
            .get(key)
            .cloned()
    }

    fn bind(&self, key: &AnyKey, source: ValueSource) -> bool {
        if source.value_type() != key.value_type() {
            tracing::debug!(
                key = %key.address(),
                key_type = key.type_name(),
                source_type = source.type_name(),
                "Refusing binding with mismatched type"
            );
            return false;
        }
        self.sources
            .write()
            .expect("values bindings lock poisoned")
            .insert(key.clone(), source);
        true
    }
}

/// The root of a values tree. No parent.
#[derive(Default)]
pub struct RootValues {
    bindings: Bindings,
}

impl RootValues {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Values for RootValues {
    fn path(&self) -> String {
        "/".to_string()
    }

    fn value_source(&self, key: &AnyKey) -> Option<ValueSource> {
        self.bindings.get(key)
    }

    fn value(&self, key: &AnyKey) -> Option<Value> {
        let source = self.bindings.get(key)?;
        Some(source.resolve(self))
    }
}

impl MutableValues for RootValues {
    fn bind(&self, key: &AnyKey, source: ValueSource) -> bool {
        self.bindings.bind(key, source)
    }
}

/// A named scope that shadows its parent.
pub struct ChildValues {
    parent: Option<Arc<dyn Values>>,
    name: String,
    bindings: Bindings,
}

impl ChildValues {
    /// Create a child scope. A missing parent behaves like an empty root.
    pub fn new(parent: Option<Arc<dyn Values>>, name: impl Into<String>) -> Self {
        Self {
            parent,
            name: name.into(),
            bindings: Bindings::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Values for ChildValues {
    fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}{}/", parent.path(), self.name),
            None => format!("/{}/", self.name),
        }
    }

    fn value_source(&self, key: &AnyKey) -> Option<ValueSource> {
        if let Some(source) = self.bindings.get(key) {
            return Some(source);
        }
        self.parent.as_ref()?.value_source(key)
    }

    fn value(&self, key: &AnyKey) -> Option<Value> {
        // evaluated against this leaf, not the scope the source was bound in
        let source = self.value_source(key)?;
        Some(source.resolve(self))
    }
}

impl MutableValues for ChildValues {
    fn bind(&self, key: &AnyKey, source: ValueSource) -> bool {
        self.bindings.bind(key, source)
    }
}

/// Memoizing view over another container.
///
/// Sources are located in the wrapped container but evaluated against the
/// cache itself, so nested providers and aliases also go through the cache.
/// Once a key has been resolved here, the result never changes.
pub struct CachedValues {
    inner: Arc<dyn Values>,
    cache: Mutex<HashMap<AnyKey, Value>>,
}

impl CachedValues {
    pub fn new(inner: Arc<dyn Values>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &AnyKey) -> Option<Value> {
        self.cache
            .lock()
            .expect("values cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Store `value` unless another resolution won the race; returns the stored value.
    fn put(&self, key: &AnyKey, value: Value) -> Value {
        self.cache
            .lock()
            .expect("values cache lock poisoned")
            .entry(key.clone())
            .or_insert(value)
            .clone()
    }
}

impl Values for CachedValues {
    fn path(&self) -> String {
        let path = self.inner.path();
        let trimmed = path.strip_suffix('/').unwrap_or(&path);
        format!("{}(c)/", trimmed)
    }

    fn value_source(&self, key: &AnyKey) -> Option<ValueSource> {
        self.inner.value_source(key)
    }

    fn value(&self, key: &AnyKey) -> Option<Value> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        let source = self.inner.value_source(key)?;
        // no lock held here: the source may resolve other keys through us
        let value = source.resolve(self);
        Some(self.put(key, value))
    }
}
