use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use tracing::debug;
use zeroize::Zeroizing;

use super::credentials::{AuthInfo, CREDENTIAL_REALM};
use super::platform::{ProbeStatus, ServerPlatform};
use super::prompt::UserInfo;
use super::services::LocationServices;
use crate::error::{CredentialField, CvsError};
use crate::location::{LocationAddress, Port, parse_location};

/// Program name servers prefix their messages with unless told otherwise.
pub const DEFAULT_REMOTE_CVS_PROGRAM: &str = "cvs";

/// Credentials that may change after construction.
///
/// Only the parts the address leaves open are ever stored here; fixed parts
/// are read from the address itself.
#[derive(Clone, Default)]
struct CredentialCell {
    username: Option<String>,
    password: Option<Zeroizing<String>>,
}

/// A repository address together with the runtime state needed to connect to
/// it.
///
/// Two locations are equal when their canonical forms are, so locations that
/// differ only in password compare and hash alike.
pub struct RepositoryLocation {
    address: LocationAddress,
    key: String,
    credentials: CredentialCell,
    server_platform: ServerPlatform,
    remote_program: String,
    services: LocationServices,
}

impl RepositoryLocation {
    /// Wraps `address`.
    ///
    /// A password that the address does not fix is kept as a mutable,
    /// in-memory credential.
    pub fn new(address: LocationAddress, services: LocationServices) -> Self {
        let mut credentials = CredentialCell::default();
        let address = if address.is_password_fixed() {
            address
        } else {
            credentials.password = address.password().map(|password| Zeroizing::new(password.to_owned()));
            address.without_password()
        };
        let key = address.to_text();
        Self {
            address,
            key,
            credentials,
            server_platform: ServerPlatform::Undetermined,
            remote_program: DEFAULT_REMOTE_CVS_PROGRAM.to_owned(),
            services,
        }
    }

    /// Parses `text` with the methods registered in `services`.
    pub fn from_text(text: &str, services: LocationServices) -> Result<Self, CvsError> {
        let address = parse_location(text, services.methods())?;
        Ok(Self::new(address, services))
    }

    /// Builds a location from discrete configuration fields.
    pub fn from_properties(
        properties: &HashMap<String, String>,
        services: LocationServices,
    ) -> Result<Self, CvsError> {
        let address = LocationAddress::from_properties(properties, services.methods())?;
        Ok(Self::new(address, services))
    }

    /// The parsed address. Its password is present only when fixed.
    #[must_use]
    pub const fn address(&self) -> &LocationAddress {
        &self.address
    }

    /// Collaborators used by this location.
    #[must_use]
    pub const fn services(&self) -> &LocationServices {
        &self.services
    }

    /// Connection method name.
    #[must_use]
    pub fn method(&self) -> &str {
        self.address.method()
    }

    /// Server host.
    #[must_use]
    pub fn host(&self) -> &str {
        self.address.host()
    }

    /// Server port.
    #[must_use]
    pub const fn port(&self) -> Port {
        self.address.port()
    }

    /// Repository path on the server.
    #[must_use]
    pub fn root(&self) -> &str {
        self.address.root()
    }

    /// Canonical form, also the credential store key.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.key
    }

    /// Reports whether the username may change.
    #[must_use]
    pub const fn is_username_mutable(&self) -> bool {
        !self.address.is_user_fixed()
    }

    /// Reports whether the password is fixed by the address.
    #[must_use]
    pub const fn is_password_fixed(&self) -> bool {
        self.address.is_password_fixed()
    }

    /// Username known without consulting the credential store.
    #[must_use]
    pub fn known_username(&self) -> Option<&str> {
        self.address.user().or(self.credentials.username.as_deref())
    }

    pub(crate) fn known_password(&self) -> Option<&str> {
        if self.address.is_password_fixed() {
            self.address.password()
        } else {
            self.credentials.password.as_ref().map(|password| password.as_str())
        }
    }

    /// Username to connect as, empty when none is known.
    ///
    /// A mutable username that is not yet known is looked up in the
    /// credential store; store failures are treated as a miss.
    pub fn username(&mut self) -> String {
        if self.known_username().is_none()
            && self.is_username_mutable()
            && let Err(error) = self.retrieve_password()
        {
            debug!(target: "cvs::auth", location = %self.key, %error, "credential lookup failed");
        }
        self.known_username().unwrap_or_default().to_owned()
    }

    /// Changes the username.
    ///
    /// # Errors
    ///
    /// [`CvsError::FixedCredential`] when the address fixes the username.
    pub fn set_username(&mut self, username: impl Into<String>) -> Result<(), CvsError> {
        if !self.is_username_mutable() {
            return Err(CvsError::FixedCredential {
                field: CredentialField::Username,
            });
        }
        self.credentials.username = Some(username.into());
        Ok(())
    }

    /// Changes the in-memory password. It is cleared again once
    /// [`update_cache`](Self::update_cache) has stored it.
    ///
    /// # Errors
    ///
    /// [`CvsError::FixedCredential`] when the address fixes the password.
    pub fn set_password(&mut self, password: impl Into<String>) -> Result<(), CvsError> {
        if self.is_password_fixed() {
            return Err(CvsError::FixedCredential {
                field: CredentialField::Password,
            });
        }
        self.credentials.password = Some(Zeroizing::new(password.into()));
        Ok(())
    }

    /// Snapshot of the credentials for a prompter.
    ///
    /// `make_username_mutable` marks the username editable in the snapshot even
    /// when the location fixes it; [`set_user_info`](Self::set_user_info)
    /// still refuses to change a fixed username.
    pub fn user_info(&mut self, make_username_mutable: bool) -> UserInfo {
        let username = self.username();
        UserInfo::new(
            username,
            self.known_password().map(str::to_owned),
            make_username_mutable || self.is_username_mutable(),
        )
    }

    /// Applies a snapshot returned by a prompter.
    ///
    /// # Errors
    ///
    /// [`CvsError::FixedCredential`] when the snapshot changes a fixed part.
    pub fn set_user_info(&mut self, info: &UserInfo) -> Result<(), CvsError> {
        if let Some(fixed) = self.address.user() {
            if fixed != info.username() {
                return Err(CvsError::FixedCredential {
                    field: CredentialField::Username,
                });
            }
        } else {
            self.credentials.username =
                (!info.username().is_empty()).then(|| info.username().to_owned());
        }

        if self.is_password_fixed() {
            if info.password() != self.address.password() {
                return Err(CvsError::FixedCredential {
                    field: CredentialField::Password,
                });
            }
        } else {
            self.credentials.password = info.password().map(|password| Zeroizing::new(password.to_owned()));
        }
        Ok(())
    }

    /// Pushes the in-memory credentials to the credential store and clears the
    /// in-memory password. Does nothing when the password is fixed.
    pub fn update_cache(&mut self) -> Result<(), CvsError> {
        if self.is_password_fixed() {
            return Ok(());
        }
        let info = AuthInfo::new(
            self.known_username().map(str::to_owned),
            self.known_password().map(str::to_owned),
        );
        self.services
            .credential_store()
            .put(&self.key, CREDENTIAL_REALM, &info)?;
        self.credentials.password = None;
        self.services.known_locations().ensure_known(&self.key);
        debug!(target: "cvs::auth", location = %self.key, "credentials cached");
        Ok(())
    }

    /// Removes this location's entry from the credential store.
    pub fn flush_user_info(&self) -> Result<(), CvsError> {
        self.services
            .credential_store()
            .forget(&self.key, CREDENTIAL_REALM)?;
        debug!(target: "cvs::auth", location = %self.key, "cached credentials forgotten");
        Ok(())
    }

    /// Forgets cached credentials. Call before discarding the location.
    pub fn dispose(&self) -> Result<(), CvsError> {
        self.flush_user_info()
    }

    /// Switches to another registered connection method. Returns `false`,
    /// leaving the location unchanged, for unknown names.
    pub fn set_method(&mut self, method: &str) -> bool {
        if !self.services.methods().contains(method) {
            return false;
        }
        self.address = self.address.with_method(method);
        self.key = self.address.to_text();
        true
    }

    /// Server kind recorded by the last version probe.
    #[must_use]
    pub const fn server_platform(&self) -> ServerPlatform {
        self.server_platform
    }

    /// Records the server kind reported by a version probe.
    pub fn set_server_platform(&mut self, status: &ProbeStatus) {
        self.server_platform = status.platform();
        debug!(
            target: "cvs::connection",
            location = %self.key,
            platform = %self.server_platform,
            "server platform recorded"
        );
    }

    /// Name of the `cvs` program on the server.
    #[must_use]
    pub fn remote_cvs_program_name(&self) -> &str {
        &self.remote_program
    }

    /// Overrides the name of the `cvs` program on the server.
    pub fn set_remote_cvs_program_name(&mut self, name: impl Into<String>) {
        self.remote_program = name.into();
    }

    /// Strips `"<program> <prefix>"` from a server error line.
    ///
    /// Returns `None` when the line does not start with the remote program
    /// name followed by `prefix`, as in `cvs server: ...` or
    /// `cvs [server aborted]: ...`.
    #[must_use]
    pub fn server_message_without_prefix<'a>(&self, line: &'a str, prefix: &str) -> Option<&'a str> {
        let message = line.strip_prefix(self.remote_program.as_str())?;
        let message = message.strip_prefix(' ')?.strip_prefix(prefix)?;
        Some(message.strip_prefix(' ').unwrap_or(message))
    }

    /// Reads the credential store entry, adopting its username when the
    /// username is mutable, and returns its password.
    pub(crate) fn retrieve_password(&mut self) -> Result<Option<Zeroizing<String>>, CvsError> {
        let Some(info) = self
            .services
            .credential_store()
            .get(&self.key, CREDENTIAL_REALM)?
        else {
            debug!(target: "cvs::auth", location = %self.key, "no cached credentials");
            return Ok(None);
        };
        debug!(target: "cvs::auth", location = %self.key, "cached credentials found");
        if let Some(username) = info.username()
            && self.is_username_mutable()
        {
            self.credentials.username = Some(username.to_owned());
        }
        Ok(info.password().map(|password| Zeroizing::new(password.to_owned())))
    }
}

impl PartialEq for RepositoryLocation {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RepositoryLocation {}

impl Hash for RepositoryLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl fmt::Debug for RepositoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryLocation")
            .field("location", &self.key)
            .field("username", &self.known_username())
            .field("server_platform", &self.server_platform)
            .finish_non_exhaustive()
    }
}
