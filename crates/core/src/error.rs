//! Error taxonomy shared by every layer of the crate.

use std::fmt;
use std::io;

use cvs_io::CommunicationError;
use thiserror::Error;

use crate::location::LocationError;

/// Canonical shape of a location string, shown alongside parse failures.
pub const LOCATION_FORM: &str = ":method:[user[:password]@]host[#port]:/path/to/repository";

/// Result alias used throughout the crate.
pub type Result<T, E = CvsError> = std::result::Result<T, E>;

/// Top-level error returned by location, transport and authentication APIs.
#[derive(Debug, Error)]
pub enum CvsError {
    /// The location text or properties could not be interpreted.
    #[error("{0}; expected {form}", form = LOCATION_FORM)]
    Location(#[from] LocationError),
    /// The server rejected the credentials, or none could be obtained.
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    /// Failure below the credential layer: resolution, connect, spawn, framing.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// I/O failure on an established connection.
    #[error(transparent)]
    Communication(#[from] CommunicationError),
    /// The credential store could not be read or written.
    #[error(transparent)]
    CredentialStore(#[from] CredentialStoreError),
    /// A setter tried to change a credential fixed by the location text.
    #[error("the {field} of this location is fixed and cannot be changed")]
    FixedCredential {
        /// Which credential was fixed.
        field: CredentialField,
    },
    /// The caller's monitor was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl CvsError {
    /// Returns the authentication failure, if this is one.
    #[must_use]
    pub const fn as_authentication(&self) -> Option<&AuthenticationError> {
        match self {
            Self::Authentication(error) => Some(error),
            _ => None,
        }
    }

    /// Reports whether prompting for new credentials may resolve the error.
    #[must_use]
    pub fn is_retryable_authentication(&self) -> bool {
        self.as_authentication()
            .is_some_and(AuthenticationError::is_retryable)
    }
}

/// Credential fields of a repository location.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialField {
    /// The account name.
    Username,
    /// The account password.
    Password,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Username => "username",
            Self::Password => "password",
        })
    }
}

/// Why an authentication attempt failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthenticationFailure {
    /// The server answered `I HATE YOU`.
    Rejected,
    /// The server reported that the account does not exist.
    UnknownUser,
    /// The password cannot be scrambled for the pserver wire format.
    InvalidCredentialCharacter {
        /// The offending character.
        ch: char,
    },
    /// No username was available for the attempt.
    UsernameRequired,
    /// Credentials were rejected and nobody can be asked for new ones.
    NoAuthenticator,
    /// The user dismissed the credential prompt.
    Cancelled,
    /// The server does not support this kind of location.
    UnsupportedServer,
}

impl AuthenticationFailure {
    const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Rejected
                | Self::UnknownUser
                | Self::InvalidCredentialCharacter { .. }
                | Self::UsernameRequired
        )
    }
}

/// Credentials were rejected or could not be obtained.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct AuthenticationError {
    failure: AuthenticationFailure,
    message: String,
}

impl AuthenticationError {
    /// Creates an error of the given kind with a user-facing message.
    pub fn new(failure: AuthenticationFailure, message: impl Into<String>) -> Self {
        Self {
            failure,
            message: message.into(),
        }
    }

    /// The server rejected the credentials.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(AuthenticationFailure::Rejected, message)
    }

    /// The password holds `ch`, which the pserver scrambling cannot encode.
    #[must_use]
    pub fn invalid_character(ch: char) -> Self {
        Self::new(
            AuthenticationFailure::InvalidCredentialCharacter { ch },
            "the password contains a character that cannot be sent to a pserver",
        )
    }

    /// The credential prompt was dismissed after `last` failed.
    #[must_use]
    pub fn cancelled(last: &Self) -> Self {
        Self::new(AuthenticationFailure::Cancelled, last.message.clone())
    }

    /// Returns the failure kind.
    #[must_use]
    pub const fn failure(&self) -> AuthenticationFailure {
        self.failure
    }

    /// Returns the message, verbatim from the server when it supplied one.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Reports whether new credentials could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.failure.is_retryable()
    }

    /// Reports whether the failure ended a credential prompt.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.failure, AuthenticationFailure::Cancelled)
    }
}

/// Failure below the credential layer.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<io::Error>,
}

impl TransportError {
    /// Creates an error that has no underlying I/O cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error caused by `source`.
    pub fn with_source(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns the rendered message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the I/O error kind of the underlying cause, if any.
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.source.as_ref().map(io::Error::kind)
    }
}

/// Failure of a credential store backend.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    /// Reading or writing the backing file failed.
    #[error("failed to {action} credential store {path}: {source}")]
    Io {
        /// What was being done.
        action: &'static str,
        /// The file involved.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The backing file does not contain a valid credential document.
    #[error("credential store {path} is corrupt: {detail}")]
    Format {
        /// The file involved.
        path: String,
        /// What is wrong with it.
        detail: String,
    },
    /// A backend-specific failure.
    #[error("credential store unavailable: {0}")]
    Backend(String),
}

/// Builds a [`TransportError`] naming the failed action and its target.
///
/// Renders as `failed to {action} {target}: {error}`.
pub(crate) fn socket_error(
    action: &str,
    target: impl fmt::Display,
    error: io::Error,
) -> CvsError {
    let text = format!("failed to {action} {target}: {error}");
    CvsError::Transport(TransportError::with_source(text, error))
}

/// Builds a [`TransportError`] without an I/O cause.
pub(crate) fn transport_error(text: impl Into<String>) -> CvsError {
    CvsError::Transport(TransportError::new(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ParsePhase;

    #[test]
    fn location_errors_carry_the_expected_form() {
        let error = CvsError::from(LocationError::Malformed {
            phase: ParsePhase::Root,
            text: String::from("example.com"),
        });
        let rendered = error.to_string();
        assert!(rendered.contains("repository path"), "{rendered}");
        assert!(rendered.ends_with(LOCATION_FORM), "{rendered}");
    }

    #[test]
    fn socket_errors_name_action_and_target() {
        let error = socket_error(
            "connect to",
            "cvs.example.org:2401",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(
            error.to_string(),
            "failed to connect to cvs.example.org:2401: refused"
        );
        match error {
            CvsError::Transport(inner) => {
                assert_eq!(inner.io_kind(), Some(io::ErrorKind::ConnectionRefused));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn retryability_follows_failure_kind() {
        assert!(AuthenticationError::rejected("login refused").is_retryable());
        assert!(
            AuthenticationError::new(AuthenticationFailure::UsernameRequired, "username required")
                .is_retryable()
        );
        assert!(
            !AuthenticationError::new(AuthenticationFailure::NoAuthenticator, "no authenticator")
                .is_retryable()
        );

        let last = AuthenticationError::rejected("bad password");
        let cancelled = AuthenticationError::cancelled(&last);
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_retryable());
        assert_eq!(cancelled.message(), "bad password");
    }

    #[test]
    fn fixed_credential_names_the_field() {
        let error = CvsError::FixedCredential {
            field: CredentialField::Password,
        };
        assert_eq!(
            error.to_string(),
            "the password of this location is fixed and cannot be changed"
        );
    }
}
