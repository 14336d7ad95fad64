use std::fmt;

use zeroize::Zeroizing;

use super::LocationError;

/// Port component of a location.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Port {
    /// No port was given; the transport picks its default.
    #[default]
    Default,
    /// An explicit, non-zero port.
    Explicit(u16),
}

impl Port {
    /// Maps a port number, treating `0` as "use the default".
    #[must_use]
    pub const fn from_number(port: u16) -> Self {
        if port == 0 {
            Self::Default
        } else {
            Self::Explicit(port)
        }
    }

    /// Returns the explicit port, if any.
    #[must_use]
    pub const fn explicit(self) -> Option<u16> {
        match self {
            Self::Default => None,
            Self::Explicit(port) => Some(port),
        }
    }

    /// Returns the explicit port or `default`.
    #[must_use]
    pub const fn or(self, default: u16) -> u16 {
        match self {
            Self::Default => default,
            Self::Explicit(port) => port,
        }
    }

    /// Reports whether no explicit port was given.
    #[must_use]
    pub const fn is_default(self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Parsed repository address.
///
/// The username is *fixed* when the address text named it; a fixed username
/// is part of the canonical form and cannot change for the lifetime of a
/// repository location. The password is fixed only when the username is fixed
/// and the text also supplied a password; such a location never consults a
/// credential store.
///
/// The canonical form returned by [`to_text`](Self::to_text) and `Display`
/// never contains the password.
#[derive(Clone, Eq, PartialEq)]
pub struct LocationAddress {
    method: String,
    user: Option<String>,
    password: Option<Zeroizing<String>>,
    host: String,
    port: Port,
    root: String,
    password_fixed: bool,
}

impl LocationAddress {
    /// Starts building an address from its required components.
    pub fn builder(
        method: impl Into<String>,
        host: impl Into<String>,
        root: impl Into<String>,
    ) -> LocationAddressBuilder {
        LocationAddressBuilder {
            method: method.into(),
            user: None,
            password: None,
            fix_password: true,
            host: host.into(),
            port: Port::Default,
            root: root.into(),
        }
    }

    /// Name of the connection method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Username given by the address, if any.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Password given alongside the address, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|password| password.as_str())
    }

    /// Server host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    pub const fn port(&self) -> Port {
        self.port
    }

    /// Repository path on the server, always using `/` separators.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Reports whether the username is fixed.
    pub const fn is_user_fixed(&self) -> bool {
        self.user.is_some()
    }

    /// Reports whether the password is fixed.
    pub const fn is_password_fixed(&self) -> bool {
        self.password_fixed
    }

    /// Returns a copy using a different connection method.
    #[must_use]
    pub fn with_method(&self, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..self.clone()
        }
    }

    /// Returns a copy without the password.
    #[must_use]
    pub fn without_password(&self) -> Self {
        Self {
            password: None,
            password_fixed: false,
            ..self.clone()
        }
    }

    /// Renders the canonical, password-free form.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LocationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}:", self.method)?;
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        f.write_str(&self.host)?;
        if let Port::Explicit(port) = self.port {
            write!(f, "#{port}")?;
        }
        write!(f, ":{}", self.root)
    }
}

impl fmt::Debug for LocationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationAddress")
            .field("method", &self.method)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("root", &self.root)
            .field("password_fixed", &self.password_fixed)
            .finish()
    }
}

/// Builder for [`LocationAddress`].
#[derive(Clone)]
pub struct LocationAddressBuilder {
    method: String,
    user: Option<String>,
    password: Option<Zeroizing<String>>,
    fix_password: bool,
    host: String,
    port: Port,
    root: String,
}

impl LocationAddressBuilder {
    /// Fixes the username. An empty name leaves the username unset.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        let user = user.into();
        self.user = (!user.is_empty()).then_some(user);
        self
    }

    /// Supplies a password that is fixed together with the username.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self.fix_password = true;
        self
    }

    /// Supplies a password used for the first attempt only; it is never fixed.
    pub fn initial_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self.fix_password = false;
        self
    }

    /// Sets the port.
    pub const fn port(mut self, port: Port) -> Self {
        self.port = port;
        self
    }

    /// Validates the components and produces the address.
    ///
    /// Backslashes in the repository path are converted to `/`.
    pub fn build(self) -> Result<LocationAddress, LocationError> {
        if self.host.is_empty() {
            return Err(LocationError::HostRequired);
        }
        if self.root.is_empty() {
            return Err(LocationError::RootRequired);
        }
        let password_fixed = self.fix_password && self.user.is_some() && self.password.is_some();
        Ok(LocationAddress {
            method: self.method,
            user: self.user,
            password: self.password,
            host: self.host,
            port: self.port,
            root: self.root.replace('\\', "/"),
            password_fixed,
        })
    }
}
