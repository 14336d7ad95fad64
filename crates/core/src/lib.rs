#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Error types shared by every layer of the crate.
pub mod error;
/// Parsing, validation and rendering of repository location strings.
pub mod location;
/// Repository locations with credentials and the authentication retry loop.
pub mod repository;
/// Connection methods that reach a CVS server.
pub mod transport;

pub use error::{
    AuthenticationError, AuthenticationFailure, CredentialField, CredentialStoreError, CvsError,
    LOCATION_FORM, TransportError,
};
pub use location::{LocationAddress, LocationError, Port, parse_location, validate_location};
pub use repository::RepositoryLocation;
pub use transport::{ConnectOptions, Connection, Monitor};
