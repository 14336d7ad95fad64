//! Child processes used as server streams.
//!
//! Transports that delegate connection setup to an external tool (a remote
//! shell such as `ssh` or `rsh`) spawn it through [`ProgramCommand`] and talk
//! to the server over the resulting [`ProgramStream`].

mod stream;


use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

pub use stream::{EXIT_GRACE, ProgramExit, ProgramStream};

/// Command line of a child process that speaks the CVS protocol on its stdio.
#[derive(Clone, Eq, PartialEq)]
pub struct ProgramCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ProgramCommand {
    /// Creates a command running `program` with no arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, A>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the program to execute.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Returns the arguments passed to the program.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Spawns the child with piped stdin and stdout; stderr is inherited so
    /// remote-shell diagnostics reach the user.
    ///
    /// # Errors
    ///
    /// Fails when the program cannot be started or does not expose both
    /// pipes. In the latter case the child is killed and reaped before the
    /// error is returned.
    pub fn spawn(&self) -> io::Result<ProgramStream> {
        let mut builder = Command::new(&self.program);
        builder.args(&self.args);
        builder.stdin(Stdio::piped());
        builder.stdout(Stdio::piped());
        builder.stderr(Stdio::inherit());

        debug!(
            target: "cvs::transport",
            program = %self.program.to_string_lossy(),
            args = self.args.len(),
            "spawning server program"
        );
        let child = builder.spawn()?;
        ProgramStream::from_child(child)
    }
}

impl fmt::Display for ProgramCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

impl fmt::Debug for ProgramCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramCommand")
            .field("program", &self.program)
            .field("args", &self.args.len())
            .finish()
    }
}
