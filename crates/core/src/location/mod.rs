//! Repository location addresses.
//!
//! A location names a CVS repository in the compact form
//! `:method:[user[:password]@]host[#port]:root`. [`LocationAddress`] is the
//! parsed, immutable value; [`parse_location`] and [`validate_location`] turn
//! text into it and [`LocationAddress::from_properties`] builds it from
//! discrete fields.

mod address;
mod parse;
mod properties;
mod validate;

use std::fmt;

use thiserror::Error;

pub use address::{LocationAddress, LocationAddressBuilder, Port};
pub use parse::{check_location, parse_location};
pub use properties::{
    PROPERTY_CONNECTION, PROPERTY_HOST, PROPERTY_PASSWORD, PROPERTY_PORT, PROPERTY_ROOT,
    PROPERTY_USER,
};
pub use validate::{ValidationResult, validate_location};

/// Grammar segment being parsed when a location was rejected.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ParsePhase {
    /// The `:method:` prefix.
    Method,
    /// The user name before `@`.
    User,
    /// The password between `:` and `@`.
    Password,
    /// The host name.
    Host,
    /// The port after `#`.
    Port,
    /// The repository path after the host.
    Root,
}

impl fmt::Display for ParsePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Method => "connection method",
            Self::User => "user name",
            Self::Password => "password",
            Self::Host => "host",
            Self::Port => "port",
            Self::Root => "repository path",
        })
    }
}

/// Reasons a location is rejected.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum LocationError {
    /// The location text is empty.
    #[error("location is empty")]
    Empty,
    /// The location text ends with a space or tab.
    #[error("location must not end with whitespace")]
    TrailingWhitespace,
    /// The location text does not start with `:method:`.
    #[error("location must start with ':' followed by a connection method and ':'")]
    MissingLeadingColon,
    /// A user, host or repository path segment is empty or missing.
    #[error("location is missing a user, host or repository path segment")]
    IncompleteLocation,
    /// The method is not registered.
    #[error(
        "unknown connection method '{requested}' (known methods: {})",
        .known.join(", ")
    )]
    UnknownMethod {
        /// The method named by the location.
        requested: String,
        /// Every registered method.
        known: Vec<String>,
    },
    /// Properties did not name a host.
    #[error("a host is required")]
    HostRequired,
    /// Properties did not name a repository path.
    #[error("a repository path is required")]
    RootRequired,
    /// A grammar segment could not be parsed.
    #[error("invalid {phase} in location: '{text}'")]
    Malformed {
        /// The segment being parsed.
        phase: ParsePhase,
        /// The offending text. Passwords are never echoed.
        text: String,
    },
}

impl LocationError {
    pub(crate) fn malformed(phase: ParsePhase, text: &str) -> Self {
        let text = if phase == ParsePhase::Password {
            String::from("***")
        } else {
            text.to_owned()
        };
        Self::Malformed { phase, text }
    }

    /// Returns the phase of a grammar failure.
    #[must_use]
    pub const fn phase(&self) -> Option<ParsePhase> {
        match self {
            Self::Malformed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
