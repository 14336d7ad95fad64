//! Connection methods.
//!
//! A [`ConnectionMethod`] turns a [`ConnectRequest`] into an unopened
//! [`cvs_io::ServerConnection`]. Two methods are built in:
//!
//! - `pserver` ([`PServerMethod`]) dials the server over TCP, optionally
//!   through an HTTP or SOCKS5 proxy, and authenticates with the scrambled
//!   password handshake;
//! - `ext` ([`ExtMethod`]) spawns a remote shell that starts `cvs server` on
//!   the remote host.
//!
//! Further methods can be added to a [`MethodRegistry`] at start-up.

mod ext;
mod options;
mod proxy;
mod pserver;
mod registry;
mod socket;

use cvs_io::ServerConnection;

use crate::error::CvsError;
use crate::location::LocationAddress;

pub use ext::{
    CVS_RSH_ENV, CVS_RSH_PARAMETERS_ENV, CVS_SERVER_ENV, ExtConnection, ExtMethod, ExtSettings,
    INVOKE_SERVER_COMMAND,
};
pub use options::{ConnectOptions, ConnectOptionsBuilder, Monitor};
pub use proxy::{CVS_PROXY_ENV, ProxyConfig, ProxyKind, parse_proxy_spec};
pub use pserver::{PServerConnection, PServerMethod};
pub use registry::MethodRegistry;
pub use socket::HostPort;

/// Name of the pserver method.
pub const PSERVER_METHOD: &str = "pserver";
/// Name of the ext method.
pub const EXT_METHOD: &str = "ext";

/// Server connection produced by a [`ConnectionMethod`].
pub type BoxedServerConnection = Box<dyn ServerConnection<Error = CvsError> + Send>;

/// Line-framed connection over any registered transport.
pub type Connection = cvs_io::Connection<BoxedServerConnection>;

/// Everything a method needs to reach a server.
#[derive(Clone, Copy)]
pub struct ConnectRequest<'a> {
    /// Where to connect.
    pub address: &'a LocationAddress,
    /// Account to authenticate as.
    pub username: &'a str,
    /// Password for the account; empty when none is known.
    pub password: &'a str,
    /// Timeouts, proxy and remote-shell settings.
    pub options: &'a ConnectOptions,
    /// Cancellation and timeout for this attempt.
    pub monitor: &'a Monitor,
}

/// A named way of reaching a CVS server.
pub trait ConnectionMethod: Send + Sync {
    /// Name used in the `:method:` segment of a location.
    fn name(&self) -> &str;

    /// Prepares a connection for `request`. Nothing is opened yet.
    fn create_connection(
        &self,
        request: &ConnectRequest<'_>,
    ) -> Result<BoxedServerConnection, CvsError>;
}
