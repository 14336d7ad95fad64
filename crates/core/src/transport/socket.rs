//! TCP plumbing shared by the pserver method and the proxy tunnels.

use std::fmt;
use std::io::{self, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::debug;

use super::Monitor;
use crate::error::{CvsError, socket_error, transport_error};

/// `host:port` rendering that brackets IPv6 literals.
#[derive(Clone, Copy, Debug)]
pub struct HostPort<'a> {
    host: &'a str,
    port: u16,
}

impl<'a> HostPort<'a> {
    /// Pairs a host with a port.
    pub const fn new(host: &'a str, port: u16) -> Self {
        Self { host, port }
    }

    pub(crate) const fn host(&self) -> &'a str {
        self.host
    }

    pub(crate) const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostPort<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Resolves `target` and connects to the first address that accepts.
pub(crate) fn connect_direct(
    target: HostPort<'_>,
    bind_address: Option<SocketAddr>,
    timeout: Duration,
    monitor: &Monitor,
) -> Result<TcpStream, CvsError> {
    let addresses: Vec<SocketAddr> = (target.host, target.port)
        .to_socket_addrs()
        .map_err(|error| socket_error("resolve address for", target, error))?
        .collect();
    if addresses.is_empty() {
        return Err(transport_error(format!(
            "host '{}' did not resolve to any addresses",
            target.host
        )));
    }

    let mut last_error: Option<(SocketAddr, io::Error)> = None;
    for candidate in addresses {
        if monitor.is_cancelled() {
            return Err(CvsError::Cancelled);
        }
        debug!(target: "cvs::transport", address = %candidate, "connecting");
        match connect_with_optional_bind(candidate, bind_address, Some(timeout)) {
            Ok(stream) => return Ok(stream),
            Err(error) => last_error = Some((candidate, error)),
        }
    }

    match last_error {
        Some((candidate, error)) => Err(socket_error("connect to", candidate, error)),
        None => Err(transport_error(format!("no usable address for {target}"))),
    }
}

/// Opens a TCP connection to `target`, optionally binding to a local address
/// first. The bind port is forced to `0` so the OS picks an ephemeral port.
pub(crate) fn connect_with_optional_bind(
    target: SocketAddr,
    bind_address: Option<SocketAddr>,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let Some(mut bind) = bind_address else {
        return match timeout {
            Some(duration) => TcpStream::connect_timeout(&target, duration),
            None => TcpStream::connect(target),
        };
    };

    if target.is_ipv4() != bind.is_ipv4() {
        return Err(io::Error::new(
            ErrorKind::AddrNotAvailable,
            "bind address family does not match target",
        ));
    }
    let domain = if target.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    bind.set_port(0);
    socket.bind(&SockAddr::from(bind))?;

    let target_addr = SockAddr::from(target);
    match timeout {
        Some(duration) => socket.connect_timeout(&target_addr, duration)?,
        None => socket.connect(&target_addr)?,
    }
    Ok(socket.into())
}

/// Applies the options every pserver socket needs: `TCP_NODELAY`, a short
/// read timeout for cancellation polling and a write timeout.
pub(crate) fn configure_stream(
    stream: &TcpStream,
    target: HostPort<'_>,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), CvsError> {
    stream
        .set_nodelay(true)
        .map_err(|error| socket_error("configure", target, error))?;
    stream
        .set_read_timeout(Some(poll_interval))
        .map_err(|error| socket_error("set read timeout on", target, error))?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(|error| socket_error("set write timeout on", target, error))
}

/// Payload of the I/O error a [`PollingStream`] reports on cancellation.
#[derive(Debug)]
struct ReadCancelled;

impl fmt::Display for ReadCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for ReadCancelled {}

/// Reader that turns short socket read timeouts into cancellation checks.
///
/// The socket's read timeout is the polling interval. Each expiry checks the
/// monitor; a read fails only when the monitor is cancelled or when no byte has
/// arrived within the overall timeout.
pub(crate) struct PollingStream {
    stream: TcpStream,
    monitor: Monitor,
    timeout: Duration,
}

impl PollingStream {
    pub(crate) const fn new(stream: TcpStream, monitor: Monitor, timeout: Duration) -> Self {
        Self {
            stream,
            monitor,
            timeout,
        }
    }

    pub(crate) const fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    /// Reads whatever is already queued without blocking, discarding it.
    pub(crate) fn discard_available(&mut self) -> io::Result<usize> {
        self.stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 1024];
        let mut discarded = 0;
        let outcome = loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => break Ok(discarded),
                Ok(read) => discarded += read,
                Err(error) if error.kind() == ErrorKind::WouldBlock => break Ok(discarded),
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(error) => break Err(error),
            }
        };
        self.stream.set_nonblocking(false)?;
        outcome
    }

    pub(crate) fn shutdown(&self) -> io::Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(error) if error.kind() != ErrorKind::NotConnected => Err(error),
            _ => Ok(()),
        }
    }
}

impl Read for PollingStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let started = Instant::now();
        loop {
            match self.stream.read(buf) {
                Err(error) if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if self.monitor.is_cancelled() {
                        return Err(io::Error::other(ReadCancelled));
                    }
                    if started.elapsed() >= self.timeout {
                        return Err(io::Error::new(
                            ErrorKind::TimedOut,
                            "timed out waiting for the server",
                        ));
                    }
                }
                other => return other,
            }
        }
    }
}

/// Reports whether `error` came from a cancelled [`PollingStream`].
pub(crate) fn is_cancellation(error: &io::Error) -> bool {
    error
        .get_ref()
        .is_some_and(|inner| inner.is::<ReadCancelled>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn host_port_brackets_ipv6() {
        assert_eq!(HostPort::new("localhost", 2401).to_string(), "localhost:2401");
        assert_eq!(HostPort::new("::1", 2401).to_string(), "[::1]:2401");
        assert_eq!(HostPort::new("[::1]", 2401).to_string(), "[::1]:2401");
    }

    #[test]
    fn connect_direct_reaches_loopback_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream.write_all(b"hello\n").expect("write greeting");
        });

        let mut stream = connect_direct(
            HostPort::new("127.0.0.1", port),
            None,
            Duration::from_secs(5),
            &Monitor::new(),
        )
        .expect("connect");
        let mut greeting = String::new();
        stream.read_to_string(&mut greeting).expect("read");
        assert_eq!(greeting, "hello\n");
        handle.join().expect("listener thread");
    }

    #[test]
    fn connect_direct_reports_refusal() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let error = connect_direct(
            HostPort::new("127.0.0.1", port),
            None,
            Duration::from_secs(5),
            &Monitor::new(),
        )
        .unwrap_err();
        assert!(error.to_string().starts_with("failed to connect to 127.0.0.1:"));
    }

    #[test]
    fn cancelled_monitor_stops_before_connecting() {
        let monitor = Monitor::new();
        monitor.cancel();
        let error = connect_direct(
            HostPort::new("127.0.0.1", 9),
            None,
            Duration::from_secs(5),
            &monitor,
        )
        .unwrap_err();
        assert!(matches!(error, CvsError::Cancelled));
    }

    #[test]
    fn polling_read_observes_cancellation() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(300));
            drop(stream);
        });

        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .expect("read timeout");
        let monitor = Monitor::new();
        monitor.cancel();
        let mut polling = PollingStream::new(stream, monitor, Duration::from_secs(5));
        let mut buf = [0u8; 8];
        let error = polling.read(&mut buf).unwrap_err();
        assert!(is_cancellation(&error));
        handle.join().expect("listener thread");
    }

    #[test]
    fn polling_read_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            thread::sleep(Duration::from_millis(400));
            drop(stream);
        });

        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .expect("read timeout");
        let mut polling = PollingStream::new(stream, Monitor::new(), Duration::from_millis(100));
        let mut buf = [0u8; 8];
        let error = polling.read(&mut buf).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TimedOut);
        handle.join().expect("listener thread");
    }
}
