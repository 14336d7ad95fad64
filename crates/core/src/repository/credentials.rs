//! Credential store capability and an in-memory implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use zeroize::Zeroizing;

use crate::error::CredentialStoreError;

/// Realm under which repository credentials are stored.
pub const CREDENTIAL_REALM: &str = "cvsconn";

/// Username and password recorded for a location.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct AuthInfo {
    username: Option<String>,
    password: Option<Zeroizing<String>>,
}

impl AuthInfo {
    /// Creates an entry from optional parts.
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username,
            password: password.map(Zeroizing::new),
        }
    }

    /// Stored username.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Stored password.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|password| password.as_str())
    }

    /// Reports whether neither part is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    /// Overlays the parts present in `update`.
    pub(crate) fn merge(&mut self, update: &Self) {
        if update.username.is_some() {
            self.username.clone_from(&update.username);
        }
        if update.password.is_some() {
            self.password.clone_from(&update.password);
        }
    }
}

impl fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInfo")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Keyed storage for credentials.
///
/// Keys are canonical location strings, which never contain a password.
/// Implementations must be safe to share between threads.
pub trait CredentialStore: Send + Sync {
    /// Looks up the entry for `key` in `realm`.
    fn get(&self, key: &str, realm: &str) -> Result<Option<AuthInfo>, CredentialStoreError>;

    /// Records `info` for `key` in `realm`. Parts absent from `info` keep
    /// their stored value.
    fn put(&self, key: &str, realm: &str, info: &AuthInfo) -> Result<(), CredentialStoreError>;

    /// Removes the entry for `key` in `realm`, if any.
    fn forget(&self, key: &str, realm: &str) -> Result<(), CredentialStoreError>;
}

/// Process-local credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<(String, String), AuthInfo>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Reports whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str, realm: &str) -> Result<Option<AuthInfo>, CredentialStoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&(realm.to_owned(), key.to_owned())).cloned())
    }

    fn put(&self, key: &str, realm: &str, info: &AuthInfo) -> Result<(), CredentialStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry((realm.to_owned(), key.to_owned()))
            .or_default()
            .merge(info);
        Ok(())
    }

    fn forget(&self, key: &str, realm: &str) -> Result<(), CredentialStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&(realm.to_owned(), key.to_owned()));
        Ok(())
    }
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("entries", &self.len())
            .finish()
    }
}
