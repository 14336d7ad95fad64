use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{ExtSettings, ProxyConfig};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settings shared by every connection attempt.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    timeout: Duration,
    read_poll_interval: Duration,
    bind_address: Option<SocketAddr>,
    proxy: Option<ProxyConfig>,
    ext: ExtSettings,
}

impl ConnectOptions {
    /// Starts from the defaults: a 60 second timeout polled once a second, no
    /// proxy and no remote-shell configuration.
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::default()
    }

    /// Overall limit for connecting and for any single blocking read.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Socket read timeout used to poll for cancellation.
    pub const fn read_poll_interval(&self) -> Duration {
        self.read_poll_interval
    }

    /// Local address outgoing sockets bind to.
    pub const fn bind_address(&self) -> Option<SocketAddr> {
        self.bind_address
    }

    /// Proxy used by the pserver method.
    pub const fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    /// Remote-shell settings used by the ext method.
    pub const fn ext(&self) -> &ExtSettings {
        &self.ext
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptionsBuilder::default().build()
    }
}

/// Builder for [`ConnectOptions`].
#[derive(Clone, Debug)]
pub struct ConnectOptionsBuilder {
    timeout: Duration,
    read_poll_interval: Duration,
    bind_address: Option<SocketAddr>,
    proxy: Option<ProxyConfig>,
    ext: ExtSettings,
}

impl Default for ConnectOptionsBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            read_poll_interval: DEFAULT_READ_POLL_INTERVAL,
            bind_address: None,
            proxy: None,
            ext: ExtSettings::default(),
        }
    }
}

impl ConnectOptionsBuilder {
    /// Sets the overall timeout. A zero duration keeps the default.
    #[must_use]
    #[doc(alias = "--timeout")]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Sets the cancellation polling interval. A zero duration keeps the
    /// default.
    #[must_use]
    pub const fn read_poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.read_poll_interval = interval;
        }
        self
    }

    /// Binds outgoing sockets to a local address.
    #[must_use]
    pub const fn bind_address(mut self, address: Option<SocketAddr>) -> Self {
        self.bind_address = address;
        self
    }

    /// Routes pserver connections through a proxy.
    #[must_use]
    #[doc(alias = "CVS_PROXY")]
    pub fn proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Configures the remote shell used by the ext method.
    #[must_use]
    #[doc(alias = "CVS_RSH")]
    #[doc(alias = "CVS_SERVER")]
    pub fn ext(mut self, ext: ExtSettings) -> Self {
        self.ext = ext;
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> ConnectOptions {
        ConnectOptions {
            timeout: self.timeout,
            read_poll_interval: self.read_poll_interval.min(self.timeout),
            bind_address: self.bind_address,
            proxy: self.proxy,
            ext: self.ext,
        }
    }
}

/// Cancellation flag and optional timeout threaded through a connection
/// attempt.
///
/// Clones share the flag, so a monitor handed to a worker thread can be
/// cancelled from the thread that created it.
#[derive(Clone, Debug, Default)]
pub struct Monitor {
    cancelled: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

impl Monitor {
    /// Creates a monitor that is not cancelled and uses the configured timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the timeout of [`ConnectOptions`] for attempts using this
    /// monitor.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Reports whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the timeout that applies given the connection `options`.
    #[must_use]
    pub fn effective_timeout(&self, options: &ConnectOptions) -> Duration {
        self.timeout.unwrap_or(options.timeout)
    }
}
