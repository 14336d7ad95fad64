//! Credential prompting capability.

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

use super::RepositoryLocation;

/// Credentials offered to a [`Prompter`] and read back after it returns.
#[derive(Clone, Eq, PartialEq)]
pub struct UserInfo {
    username: String,
    password: Option<Zeroizing<String>>,
    username_mutable: bool,
}

impl UserInfo {
    /// Creates a snapshot.
    pub fn new(username: impl Into<String>, password: Option<String>, username_mutable: bool) -> Self {
        Self {
            username: username.into(),
            password: password.map(Zeroizing::new),
            username_mutable,
        }
    }

    /// Username; empty when unknown.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password, if one is known or was entered.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|password| password.as_str())
    }

    /// Reports whether the prompter may change the username.
    #[must_use]
    pub const fn is_username_mutable(&self) -> bool {
        self.username_mutable
    }

    /// Replaces the username. Returns `false`, leaving it unchanged, when the
    /// username is not mutable.
    pub fn set_username(&mut self, username: impl Into<String>) -> bool {
        if !self.username_mutable {
            return false;
        }
        self.username = username.into();
        true
    }

    /// Replaces the password.
    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = Some(Zeroizing::new(password.into()));
    }
}

impl fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserInfo")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("username_mutable", &self.username_mutable)
            .finish()
    }
}

/// The user dismissed a credential prompt.
#[derive(Clone, Copy, Debug, Default, Eq, Error, PartialEq)]
#[error("credential prompt cancelled")]
pub struct PromptCancelled;

/// Asks someone for credentials after an authentication failure.
///
/// Implementations may block on user input. `message` is the failure that
/// triggered the prompt, verbatim from the server when it sent one.
pub trait Prompter: Send + Sync {
    /// Updates `info` in place, or reports that the user gave up.
    fn prompt(
        &self,
        location: &RepositoryLocation,
        info: &mut UserInfo,
        message: &str,
    ) -> Result<(), PromptCancelled>;
}
