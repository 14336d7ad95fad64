use std::fmt;
use std::sync::Arc;

use super::credentials::{CredentialStore, MemoryCredentialStore};
use super::known::{KnownLocations, NoKnownLocations};
use super::prompt::Prompter;
use crate::transport::{ConnectOptions, MethodRegistry};

/// Collaborators a [`RepositoryLocation`](super::RepositoryLocation) relies on.
///
/// Defaults: the built-in connection methods, default [`ConnectOptions`], an
/// in-memory credential store, no prompter and no known-locations registry.
/// Clones share the same collaborators.
#[derive(Clone)]
pub struct LocationServices {
    methods: Arc<MethodRegistry>,
    options: ConnectOptions,
    credentials: Arc<dyn CredentialStore>,
    prompter: Option<Arc<dyn Prompter>>,
    known: Arc<dyn KnownLocations>,
}

impl Default for LocationServices {
    fn default() -> Self {
        Self {
            methods: Arc::new(MethodRegistry::default()),
            options: ConnectOptions::default(),
            credentials: Arc::new(MemoryCredentialStore::new()),
            prompter: None,
            known: Arc::new(NoKnownLocations),
        }
    }
}

impl LocationServices {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different set of connection methods.
    #[must_use]
    pub fn with_methods(mut self, methods: MethodRegistry) -> Self {
        self.methods = Arc::new(methods);
        self
    }

    /// Uses different connection options.
    #[must_use]
    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses `store` for cached credentials.
    #[must_use]
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    /// Asks `prompter` for credentials after authentication failures.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Records attempted locations in `known`.
    #[must_use]
    pub fn with_known_locations(mut self, known: Arc<dyn KnownLocations>) -> Self {
        self.known = known;
        self
    }

    /// Registered connection methods.
    #[must_use]
    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    /// Connection options.
    #[must_use]
    pub const fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Credential store.
    #[must_use]
    pub fn credential_store(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    /// Prompter, if any.
    #[must_use]
    pub fn prompter(&self) -> Option<Arc<dyn Prompter>> {
        self.prompter.clone()
    }

    /// Known-locations registry.
    #[must_use]
    pub fn known_locations(&self) -> &dyn KnownLocations {
        self.known.as_ref()
    }
}

impl fmt::Debug for LocationServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationServices")
            .field("methods", &self.methods)
            .field("options", &self.options)
            .field("prompter", &self.prompter.is_some())
            .finish_non_exhaustive()
    }
}
