//! The `pserver` method: direct TCP with the scrambled-password handshake.

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::net::TcpStream;

use cvs_io::{ServerConnection, ServerStreams};
use protocol::{
    AuthResponse, DEFAULT_PSERVER_PORT, ResponseFraming, read_auth_response, scramble,
    write_auth_request,
};
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::proxy::connect_via_proxy;
use super::socket::{HostPort, PollingStream, configure_stream, connect_direct, is_cancellation};
use super::{
    BoxedServerConnection, ConnectOptions, ConnectRequest, ConnectionMethod, Monitor,
    PSERVER_METHOD,
};
use crate::error::{
    AuthenticationError, AuthenticationFailure, CvsError, socket_error, transport_error,
};

/// Factory for [`PServerConnection`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct PServerMethod;

impl ConnectionMethod for PServerMethod {
    fn name(&self) -> &str {
        PSERVER_METHOD
    }

    fn create_connection(
        &self,
        request: &ConnectRequest<'_>,
    ) -> Result<BoxedServerConnection, CvsError> {
        Ok(Box::new(PServerConnection::new(request)))
    }
}

struct OpenStreams {
    reader: BufReader<PollingStream>,
    writer: TcpStream,
}

/// Password-authenticated TCP connection to a CVS server.
///
/// [`open`](ServerConnection::open) connects, directly or through the
/// configured proxy, and performs the `BEGIN AUTH REQUEST` exchange. Only a
/// connection the server accepted with `I LOVE YOU` is kept.
pub struct PServerConnection {
    host: String,
    port: u16,
    root: String,
    username: String,
    password: Zeroizing<String>,
    options: ConnectOptions,
    monitor: Monitor,
    streams: Option<OpenStreams>,
}

impl PServerConnection {
    /// Prepares a connection for `request` without opening it.
    pub fn new(request: &ConnectRequest<'_>) -> Self {
        Self {
            host: request.address.host().to_owned(),
            port: request.address.port().or(DEFAULT_PSERVER_PORT),
            root: request.address.root().to_owned(),
            username: request.username.to_owned(),
            password: Zeroizing::new(request.password.to_owned()),
            options: request.options.clone(),
            monitor: request.monitor.clone(),
            streams: None,
        }
    }

    /// Port the connection dials.
    pub const fn port(&self) -> u16 {
        self.port
    }

    fn target(&self) -> HostPort<'_> {
        HostPort::new(&self.host, self.port)
    }
}

impl ServerConnection for PServerConnection {
    type Error = CvsError;

    fn open(&mut self) -> Result<(), CvsError> {
        if self.streams.is_some() {
            return Ok(());
        }

        let scrambled = Zeroizing::new(scramble(&self.password).map_err(|error| {
            let ch = error
                .invalid_character()
                .unwrap_or(char::REPLACEMENT_CHARACTER);
            AuthenticationError::invalid_character(ch)
        })?);
        if self.monitor.is_cancelled() {
            return Err(CvsError::Cancelled);
        }

        let timeout = self.monitor.effective_timeout(&self.options);
        let target = HostPort::new(&self.host, self.port);
        let (stream, framing) = match self.options.proxy() {
            Some(proxy) => (
                connect_via_proxy(
                    target,
                    proxy,
                    self.options.bind_address(),
                    timeout,
                    &self.monitor,
                )?,
                ResponseFraming::Proxied,
            ),
            None => (
                connect_direct(target, self.options.bind_address(), timeout, &self.monitor)?,
                ResponseFraming::ErrorMarked,
            ),
        };
        configure_stream(
            &stream,
            target,
            self.options.read_poll_interval().min(timeout),
            timeout,
        )?;
        let mut writer = stream
            .try_clone()
            .map_err(|error| socket_error("duplicate socket for", target, error))?;
        let mut reader = BufReader::new(PollingStream::new(stream, self.monitor.clone(), timeout));

        debug!(
            target: "cvs::auth",
            %target,
            user = %self.username,
            root = %self.root,
            "sending pserver authentication request"
        );
        write_auth_request(&mut writer, &self.root, &self.username, &scrambled)
            .map_err(|error| socket_error("write to", target, error))?;
        let response = read_auth_response(&mut reader, framing).map_err(|error| {
            if is_cancellation(&error) {
                CvsError::Cancelled
            } else {
                socket_error("read from", target, error)
            }
        })?;

        match response {
            AuthResponse::Accepted => {
                info!(target: "cvs::auth", %target, user = %self.username, "pserver login accepted");
                self.streams = Some(OpenStreams { reader, writer });
                Ok(())
            }
            AuthResponse::Rejected { message } => {
                debug!(target: "cvs::auth", %target, %message, "pserver login rejected");
                Err(AuthenticationError::rejected(message).into())
            }
            AuthResponse::UnknownUser { message } => {
                debug!(target: "cvs::auth", %target, %message, "pserver reports unknown user");
                Err(AuthenticationError::new(AuthenticationFailure::UnknownUser, message).into())
            }
            AuthResponse::NoResponse => {
                Err(transport_error(format!("no response from {target}")))
            }
            AuthResponse::Refused { message } => {
                Err(transport_error(format!("connection refused: {message}")))
            }
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.streams.take() {
            Some(streams) => streams.reader.get_ref().shutdown(),
            None => Ok(()),
        }
    }

    fn streams(&mut self) -> Option<ServerStreams<'_>> {
        self.streams
            .as_mut()
            .map(|streams| ServerStreams::new(&mut streams.reader, &mut streams.writer))
    }

    fn drain_available(&mut self) -> io::Result<usize> {
        let Some(streams) = self.streams.as_mut() else {
            return Ok(0);
        };
        let buffered = streams.reader.buffer().len();
        streams.reader.consume(buffered);
        let discarded = streams.reader.get_mut().discard_available()?;
        Ok(buffered + discarded)
    }
}

impl fmt::Debug for PServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PServerConnection")
            .field("target", &self.target().to_string())
            .field("root", &self.root)
            .field("username", &self.username)
            .field("open", &self.streams.is_some())
            .finish_non_exhaustive()
    }
}
