use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::{ConnectionMethod, ExtMethod, PServerMethod};

/// Connection methods keyed by name.
///
/// [`MethodRegistry::default`] registers `pserver` and `ext`.
#[derive(Clone)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Arc<dyn ConnectionMethod>>,
}

impl MethodRegistry {
    /// Creates a registry without any methods.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            methods: BTreeMap::new(),
        }
    }

    /// Adds `method`, replacing any method registered under the same name.
    pub fn register(&mut self, method: Arc<dyn ConnectionMethod>) -> &mut Self {
        self.methods.insert(method.name().to_owned(), method);
        self
    }

    /// Looks a method up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ConnectionMethod>> {
        self.methods.get(name).cloned()
    }

    /// Reports whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Returns every registered name in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Arc::new(PServerMethod))
            .register(Arc::new(ExtMethod));
        registry
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.methods.keys()).finish()
    }
}
