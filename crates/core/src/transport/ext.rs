//! The `ext` method: a remote shell that starts `cvs server` on the far end.

use std::env;
use std::fmt;
use std::io;

use cvs_io::{EXIT_GRACE, ProgramCommand, ProgramExit, ProgramStream, ServerConnection, ServerStreams};
use tracing::{debug, warn};

use super::{BoxedServerConnection, ConnectRequest, ConnectionMethod, EXT_METHOD, Monitor};
use crate::error::{CvsError, TransportError, transport_error};
use crate::location::{LocationAddress, Port};

/// Remote shell program, for example `ssh`.
pub const CVS_RSH_ENV: &str = "CVS_RSH";
/// Optional argument template for the remote shell.
pub const CVS_RSH_PARAMETERS_ENV: &str = "CVS_RSH_PARAMETERS";
/// Path of the `cvs` executable on the server host.
pub const CVS_SERVER_ENV: &str = "CVS_SERVER";
/// Argument that makes `cvs` speak the client/server protocol on stdio.
pub const INVOKE_SERVER_COMMAND: &str = "server";

const TOKENS: [&str; 4] = ["{user}", "{password}", "{host}", "{port}"];

/// Remote-shell configuration for the ext method.
///
/// Without a parameter template the shell runs as
/// `<rsh> -l <user> <host> <server> server`. A template replaces the
/// `-l <user> <host>` part; its `{user}`, `{password}`, `{host}` and `{port}`
/// tokens are substituted in any letter case.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExtSettings {
    rsh: Option<String>,
    parameters: Option<String>,
    server: Option<String>,
}

impl ExtSettings {
    /// Reads `CVS_RSH`, `CVS_RSH_PARAMETERS` and `CVS_SERVER`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the settings from an arbitrary variable lookup. Blank values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            rsh: read(CVS_RSH_ENV),
            parameters: read(CVS_RSH_PARAMETERS_ENV),
            server: read(CVS_SERVER_ENV),
        }
    }

    /// Sets the remote shell.
    #[must_use]
    #[doc(alias = "CVS_RSH")]
    pub fn with_rsh(mut self, rsh: impl Into<String>) -> Self {
        self.rsh = Some(rsh.into());
        self
    }

    /// Sets the argument template.
    #[must_use]
    #[doc(alias = "CVS_RSH_PARAMETERS")]
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = Some(parameters.into());
        self
    }

    /// Sets the remote `cvs` executable.
    #[must_use]
    #[doc(alias = "CVS_SERVER")]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Remote shell, if configured.
    pub fn rsh(&self) -> Option<&str> {
        self.rsh.as_deref()
    }

    /// Argument template, if configured.
    pub fn parameters(&self) -> Option<&str> {
        self.parameters.as_deref()
    }

    /// Remote `cvs` executable, if configured.
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Builds the command line that reaches `address` as `username`.
    ///
    /// # Errors
    ///
    /// Fails when the shell or the server executable is not configured, and
    /// when the address names a port but no template says how to pass it.
    pub fn command(
        &self,
        address: &LocationAddress,
        username: &str,
        password: &str,
    ) -> Result<ProgramCommand, CvsError> {
        let (Some(rsh), Some(server)) = (self.rsh.as_deref(), self.server.as_deref()) else {
            return Err(transport_error(format!(
                "environment not configured: {CVS_RSH_ENV} and {CVS_SERVER_ENV} must both be set"
            )));
        };
        let mut words = rsh.split_whitespace();
        let Some(program) = words.next() else {
            return Err(transport_error(format!(
                "environment not configured: {CVS_RSH_ENV} is blank"
            )));
        };

        let mut command = ProgramCommand::new(program);
        command.args(words);
        match self.parameters.as_deref() {
            Some(template) => {
                let port = address
                    .port()
                    .explicit()
                    .map(|port| port.to_string())
                    .unwrap_or_default();
                let values = [username, password, address.host(), port.as_str()];
                command.args(
                    template
                        .split_whitespace()
                        .map(|word| substitute(word, &values))
                        .filter(|word| !word.is_empty()),
                );
            }
            None => {
                if let Port::Explicit(port) = address.port() {
                    return Err(transport_error(format!(
                        "the ext method cannot connect to port {port}; set {CVS_RSH_PARAMETERS_ENV} to pass it to {program}"
                    )));
                }
                if !username.is_empty() {
                    command.arg("-l").arg(username);
                }
                command.arg(address.host());
            }
        }
        command.arg(server).arg(INVOKE_SERVER_COMMAND);
        Ok(command)
    }
}

fn substitute(word: &str, values: &[&str; 4]) -> String {
    let mut output = String::with_capacity(word.len());
    let mut rest = word;
    'scan: while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let candidate = &rest[start..];
        for (token, value) in TOKENS.iter().zip(values) {
            if candidate
                .get(..token.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(token))
            {
                output.push_str(value);
                rest = &candidate[token.len()..];
                continue 'scan;
            }
        }
        output.push('{');
        rest = &candidate[1..];
    }
    output.push_str(rest);
    output
}

/// Factory for [`ExtConnection`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtMethod;

impl ConnectionMethod for ExtMethod {
    fn name(&self) -> &str {
        EXT_METHOD
    }

    fn create_connection(
        &self,
        request: &ConnectRequest<'_>,
    ) -> Result<BoxedServerConnection, CvsError> {
        let command = request
            .options
            .ext()
            .command(request.address, request.username, request.password)?;
        Ok(Box::new(ExtConnection::new(command, request.monitor.clone())))
    }
}

/// Connection over the stdio of a remote-shell process.
///
/// Authentication is left to the shell; opening only spawns it.
pub struct ExtConnection {
    command: ProgramCommand,
    monitor: Monitor,
    stream: Option<ProgramStream>,
}

impl ExtConnection {
    /// Prepares a connection that spawns `command` when opened.
    pub const fn new(command: ProgramCommand, monitor: Monitor) -> Self {
        Self {
            command,
            monitor,
            stream: None,
        }
    }

    /// Process id of the running shell.
    pub fn process_id(&self) -> Option<u32> {
        self.stream.as_ref().map(ProgramStream::id)
    }

    fn program_name(&self) -> String {
        self.command.program().to_string_lossy().into_owned()
    }
}

impl ServerConnection for ExtConnection {
    type Error = CvsError;

    fn open(&mut self) -> Result<(), CvsError> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.monitor.is_cancelled() {
            return Err(CvsError::Cancelled);
        }
        let stream = self.command.spawn().map_err(|error| {
            let text = format!("failed to start {}: {error}", self.program_name());
            CvsError::Transport(TransportError::with_source(text, error))
        })?;
        debug!(
            target: "cvs::transport",
            program = %self.program_name(),
            pid = stream.id(),
            "remote shell started"
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.terminate(EXIT_GRACE)? {
            ProgramExit::Exited(status) if !status.success() => warn!(
                target: "cvs::transport",
                program = %self.program_name(),
                %status,
                "remote shell exited unsuccessfully"
            ),
            ProgramExit::Exited(_) => {}
            ProgramExit::Killed(_) => debug!(
                target: "cvs::transport",
                program = %self.program_name(),
                "remote shell did not exit after end of input, killed"
            ),
        }
        Ok(())
    }

    fn streams(&mut self) -> Option<ServerStreams<'_>> {
        self.stream.as_mut().map(ProgramStream::streams)
    }
}

impl fmt::Debug for ExtConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtConnection")
            .field("program", &self.program_name())
            .field("pid", &self.process_id())
            .finish_non_exhaustive()
    }
}
