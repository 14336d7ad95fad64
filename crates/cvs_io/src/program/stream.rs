use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use crate::server::ServerStreams;

/// How long [`ProgramStream::terminate`] callers usually let a child finish
/// after its stdin is closed.
pub const EXIT_GRACE: Duration = Duration::from_secs(2);

const EXIT_POLL: Duration = Duration::from_millis(10);

/// How a child ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgramExit {
    /// The child exited on its own.
    Exited(ExitStatus),
    /// The child outlived the grace period and was killed.
    Killed(ExitStatus),
}

impl ProgramExit {
    /// Returns the reaped status.
    #[must_use]
    pub const fn status(self) -> ExitStatus {
        match self {
            Self::Exited(status) | Self::Killed(status) => status,
        }
    }

    /// Reports whether the child exited on its own with status zero.
    #[must_use]
    pub fn success(self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }
}

/// Duplex stream over a child's stdout and stdin.
///
/// Dropping the stream closes stdin, kills the child if it is still running
/// and waits for it.
pub struct ProgramStream {
    child: Child,
    stdin: StdinHalf,
    stdout: ChildStdout,
    exit: Option<ProgramExit>,
}

/// Write half that reports `BrokenPipe` once stdin has been closed.
struct StdinHalf(Option<ChildStdin>);

impl StdinHalf {
    fn close(&mut self) -> io::Result<()> {
        if let Some(mut stdin) = self.0.take() {
            stdin.flush()?;
        }
        Ok(())
    }
}

impl Write for StdinHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(stdin) => stdin.write(buf),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "server program stdin has already been closed",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl ProgramStream {
    pub(super) fn from_child(mut child: Child) -> io::Result<Self> {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok(Self {
                child,
                stdin: StdinHalf(Some(stdin)),
                stdout,
                exit: None,
            }),
            (stdin, _) => {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "server program did not expose both stdin and stdout",
                ))
            }
        }
    }

    /// Returns the child's process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Lends out stdout as the input half and stdin as the output half.
    pub fn streams(&mut self) -> ServerStreams<'_> {
        ServerStreams::new(&mut self.stdout, &mut self.stdin)
    }

    /// Flushes and closes stdin, signalling end of input to the child.
    pub fn close_stdin(&mut self) -> io::Result<()> {
        self.stdin.close()
    }

    /// Closes stdin and gives the child `grace` to exit before killing it.
    ///
    /// Calling this again returns the recorded outcome.
    pub fn terminate(&mut self, grace: Duration) -> io::Result<ProgramExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let flushed = self.close_stdin();
        let deadline = Instant::now() + grace;
        let exit = loop {
            if let Some(status) = self.child.try_wait()? {
                break ProgramExit::Exited(status);
            }
            let now = Instant::now();
            if now >= deadline {
                let _ = self.child.kill();
                break ProgramExit::Killed(self.child.wait()?);
            }
            thread::sleep(EXIT_POLL.min(deadline - now));
        };
        self.exit = Some(exit);
        flushed.map(|()| exit)
    }

    /// Returns the exit status if the child has already exited.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit.status()));
        }
        self.child.try_wait()
    }
}

impl Read for ProgramStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Write for ProgramStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdin.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdin.flush()
    }
}

impl Drop for ProgramStream {
    fn drop(&mut self) {
        let _ = self.terminate(Duration::ZERO);
    }
}

impl std::fmt::Debug for ProgramStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramStream")
            .field("pid", &self.child.id())
            .field("stdin_open", &self.stdin.0.is_some())
            .field("exit", &self.exit)
            .finish()
    }
}
