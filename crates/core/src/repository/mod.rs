//! Repository locations with their runtime state.
//!
//! [`RepositoryLocation`] wraps a [`LocationAddress`](crate::location::LocationAddress)
//! with the credentials, server classification and collaborators needed to
//! open authenticated connections. The collaborators are injected through
//! [`LocationServices`]:
//!
//! - a [`CredentialStore`] caching credentials per location,
//! - an optional [`Prompter`] asking the user for new credentials,
//! - a [`KnownLocations`] registry of attempted locations.

mod auth;
mod credentials;
mod file_store;
mod known;
mod location;
mod platform;
mod prompt;
mod services;

pub use credentials::{AuthInfo, CREDENTIAL_REALM, CredentialStore, MemoryCredentialStore};
pub use file_store::FileCredentialStore;
pub use known::{KnownLocationSet, KnownLocations, NoKnownLocations};
pub use location::{DEFAULT_REMOTE_CVS_PROGRAM, RepositoryLocation};
pub use platform::{ProbeStatus, ServerPlatform, StatusCode, StatusSeverity};
pub use prompt::{PromptCancelled, Prompter, UserInfo};
pub use services::LocationServices;
