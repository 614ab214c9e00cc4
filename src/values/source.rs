//! Value sources: the strategies bound to keys.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::values::key::{AnyKey, Key};
use crate::values::Values;

/// A resolved, type-erased value.
pub type Value = Arc<dyn Any + Send + Sync>;

type ProviderFn = dyn Fn(&dyn Values) -> Value + Send + Sync;

#[derive(Clone)]
enum Strategy {
    Constant(Value),
    Provider(Arc<ProviderFn>),
    Alias(AnyKey),
}

/// Produces a value for a key when resolved against a container.
///
/// Providers and aliases are evaluated against the container that is being
/// queried (the leaf), not the one they were bound in. A provider bound at the
/// root therefore sees values shadowed in whichever child asks for it.
#[derive(Clone)]
pub struct ValueSource {
    strategy: Strategy,
    value_type: TypeId,
    type_name: &'static str,
}

impl ValueSource {
    /// Always yields `value`.
    pub fn constant<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            strategy: Strategy::Constant(Arc::new(value)),
            value_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Calls `f` with the leaf container on every (uncached) resolution.
    pub fn provider<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&dyn Values) -> T + Send + Sync + 'static,
    {
        Self {
            strategy: Strategy::Provider(Arc::new(move |vs: &dyn Values| -> Value {
                Arc::new(f(vs))
            })),
            value_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Forwards to `target`, resolved in the querying container.
    ///
    /// # Panics
    /// Resolution panics if `target` is unbound there: only alias keys that
    /// are guaranteed to be present.
    pub fn alias<T: Any + Send + Sync>(target: &Key<T>) -> Self {
        Self {
            strategy: Strategy::Alias(target.erased().clone()),
            value_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Maps the value produced by `source` through `f`.
    ///
    /// # Panics
    /// Resolution panics if `source` does not produce a `T`.
    pub fn adapter<T, U, F>(source: ValueSource, f: F) -> Self
    where
        T: Any + Send + Sync,
        U: Any + Send + Sync,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let from = source.type_name;
        Self::provider(move |vs: &dyn Values| {
            let value = source.resolve(vs);
            match value.downcast_ref::<T>() {
                Some(t) => f(t),
                None => panic!(
                    "unable to adapt: value is {} not {}",
                    from,
                    std::any::type_name::<T>()
                ),
            }
        })
    }

    /// Reads the environment variable `name` at resolution time (empty if unset).
    pub fn env(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::provider(move |_: &dyn Values| std::env::var(&name).unwrap_or_default())
    }

    /// Declared type of the values this source produces.
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    /// Name of the declared value type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Produce the value, evaluating providers and aliases against `leaf`.
    pub fn resolve(&self, leaf: &dyn Values) -> Value {
        match &self.strategy {
            Strategy::Constant(value) => value.clone(),
            Strategy::Provider(f) => f(leaf),
            Strategy::Alias(target) => match leaf.value(target) {
                Some(value) => value,
                None => panic!(
                    "unable to resolve alias to {} ({:?}) in {}",
                    target.address(),
                    target,
                    leaf.path()
                ),
            },
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.strategy {
            Strategy::Constant(_) => "constant".to_string(),
            Strategy::Provider(_) => "provider".to_string(),
            Strategy::Alias(target) => format!("alias({})", target.address()),
        };
        write!(f, "ValueSource({}: {})", kind, self.type_name)
    }
}
