use std::collections::HashMap;

use super::{LocationAddress, LocationError, ParsePhase, Port};
use crate::transport::{MethodRegistry, PSERVER_METHOD};

/// Property naming the connection method; defaults to `pserver`.
pub const PROPERTY_CONNECTION: &str = "connection";
/// Property naming the user.
pub const PROPERTY_USER: &str = "user";
/// Property carrying an initial password.
pub const PROPERTY_PASSWORD: &str = "password";
/// Property naming the host.
pub const PROPERTY_HOST: &str = "host";
/// Property carrying the port number.
pub const PROPERTY_PORT: &str = "port";
/// Property naming the repository path.
pub const PROPERTY_ROOT: &str = "root";

impl LocationAddress {
    /// Builds an address from discrete configuration fields.
    ///
    /// An empty user counts as absent and a password without a user is
    /// dropped. A supplied user becomes fixed; the password never does and is
    /// only used for the first connection attempt.
    pub fn from_properties(
        properties: &HashMap<String, String>,
        methods: &MethodRegistry,
    ) -> Result<Self, LocationError> {
        let method = properties
            .get(PROPERTY_CONNECTION)
            .map_or(PSERVER_METHOD, String::as_str);
        if !methods.contains(method) {
            return Err(LocationError::UnknownMethod {
                requested: method.to_owned(),
                known: methods.names(),
            });
        }

        let host = properties
            .get(PROPERTY_HOST)
            .ok_or(LocationError::HostRequired)?;
        let root = properties
            .get(PROPERTY_ROOT)
            .ok_or(LocationError::RootRequired)?;
        let port = match properties.get(PROPERTY_PORT) {
            None => Port::Default,
            Some(text) => text
                .trim()
                .parse::<u16>()
                .map(Port::from_number)
                .map_err(|_| LocationError::malformed(ParsePhase::Port, text))?,
        };

        let mut builder = Self::builder(method, host.as_str(), root.as_str()).port(port);
        if let Some(user) = properties.get(PROPERTY_USER).filter(|user| !user.is_empty()) {
            builder = builder.user(user.as_str());
            if let Some(password) = properties.get(PROPERTY_PASSWORD) {
                builder = builder.initial_password(password.as_str());
            }
        }
        builder.build()
    }
}
