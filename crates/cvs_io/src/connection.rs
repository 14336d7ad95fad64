use std::io::{ErrorKind, Read};

use memchr::memchr;
use tracing::debug;

use crate::error::{CommunicationError, IoResultExt};
use crate::server::{ServerConnection, ServerStreams};

const READ_BUFFER_SIZE: usize = 8 * 1024;
const INITIAL_LINE_CAPACITY: usize = 128;

/// Line-framed conversation with a CVS server.
///
/// The connection starts closed. [`open`](Self::open) establishes the
/// underlying [`ServerConnection`]; [`close`](Self::close) drains unread input
/// and releases it, after which the same wrapper may be opened again.
///
/// Lines are terminated by a single `\n`. Incoming bytes are decoded as
/// ISO-8859-1 so that arbitrary server output maps one byte to one character.
/// Outgoing text is written as UTF-8; callers needing exact bytes use
/// [`write_bytes`](Self::write_bytes).
pub struct Connection<S: ServerConnection> {
    server: S,
    established: bool,
    buffer: Box<[u8]>,
    start: usize,
    end: usize,
    line: Vec<u8>,
}

impl<S: ServerConnection> Connection<S> {
    /// Wraps `server` without opening it.
    pub fn new(server: S) -> Self {
        Self {
            server,
            established: false,
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            start: 0,
            end: 0,
            line: Vec::with_capacity(INITIAL_LINE_CAPACITY),
        }
    }

    /// Opens the underlying server connection. Does nothing when already open.
    pub fn open(&mut self) -> Result<(), S::Error> {
        if self.established {
            return Ok(());
        }
        self.server.open()?;
        self.start = 0;
        self.end = 0;
        self.established = true;
        debug!(target: "cvs::connection", "connection established");
        Ok(())
    }

    /// Reports whether the connection is open.
    pub const fn is_established(&self) -> bool {
        self.established
    }

    /// Returns the wrapped server connection.
    pub const fn server(&self) -> &S {
        &self.server
    }

    /// Drains queued input and releases the server connection.
    ///
    /// Unread buffered bytes are discarded, then the server's queued input is
    /// drained, the output flushed and the input drained once more so the peer
    /// never writes into a closed pipe. The connection is marked closed even
    /// when one of these steps fails; the first failure is returned. Closing a
    /// closed connection is a no-op.
    pub fn close(&mut self) -> Result<(), CommunicationError> {
        if !self.established {
            return Ok(());
        }
        let drained = self.drain_pending();
        self.established = false;
        self.start = 0;
        self.end = 0;
        let released = self.server.close().during("close connection");
        debug!(
            target: "cvs::connection",
            drained = drained.as_ref().ok().copied(),
            "connection closed"
        );
        drained.map(drop).and(released)
    }

    fn drain_pending(&mut self) -> Result<usize, CommunicationError> {
        let mut drained = self.end - self.start;
        self.start = self.end;
        drained += self.server.drain_available().during("drain input")?;
        if let Some(streams) = self.server.streams() {
            streams.output.flush().during("flush output")?;
        }
        drained += self.server.drain_available().during("drain input")?;
        Ok(drained)
    }

    fn streams(&mut self, operation: &'static str) -> Result<ServerStreams<'_>, CommunicationError> {
        if !self.established {
            return Err(CommunicationError::not_established(operation));
        }
        self.server
            .streams()
            .ok_or(CommunicationError::not_established(operation))
    }

    /// Writes `text` and flushes.
    pub fn write(&mut self, text: &str) -> Result<(), CommunicationError> {
        self.send(text.as_bytes(), false, "write")
    }

    /// Writes `text` followed by `\n` and flushes.
    pub fn write_line(&mut self, text: &str) -> Result<(), CommunicationError> {
        self.send(text.as_bytes(), true, "write line")
    }

    /// Writes raw bytes and flushes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CommunicationError> {
        self.send(bytes, false, "write")
    }

    fn send(
        &mut self,
        bytes: &[u8],
        terminate: bool,
        operation: &'static str,
    ) -> Result<(), CommunicationError> {
        let streams = self.streams(operation)?;
        if terminate {
            let mut framed = Vec::with_capacity(bytes.len() + 1);
            framed.extend_from_slice(bytes);
            framed.push(b'\n');
            streams.output.write_all(&framed).during(operation)?;
        } else {
            streams.output.write_all(bytes).during(operation)?;
        }
        streams.output.flush().during(operation)
    }

    /// Flushes buffered output.
    pub fn flush(&mut self) -> Result<(), CommunicationError> {
        let streams = self.streams("flush")?;
        streams.output.flush().during("flush")
    }

    /// Reads the next line, without its terminator, decoded as ISO-8859-1.
    ///
    /// End of stream terminates the line; at end of stream an empty string is
    /// returned.
    pub fn read_line(&mut self) -> Result<String, CommunicationError> {
        let bytes = self.read_line_bytes()?;
        Ok(protocol::latin1_to_string(bytes))
    }

    /// Reads the next line as raw bytes, without its terminator.
    ///
    /// The returned slice borrows an internal buffer that is reused by the
    /// next read.
    pub fn read_line_bytes(&mut self) -> Result<&[u8], CommunicationError> {
        if !self.established {
            return Err(CommunicationError::not_established("read line"));
        }
        self.line.clear();
        loop {
            if self.start == self.end && self.fill("read line")? == 0 {
                break;
            }
            let pending = &self.buffer[self.start..self.end];
            if let Some(index) = memchr(b'\n', pending) {
                self.line.extend_from_slice(&pending[..index]);
                self.start += index + 1;
                break;
            }
            self.line.extend_from_slice(pending);
            self.start = self.end;
        }
        Ok(&self.line)
    }

    /// Fills `buf` completely from the server.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CommunicationError> {
        if !self.established {
            return Err(CommunicationError::not_established("read"));
        }
        let mut filled = 0;
        while filled < buf.len() {
            if self.start == self.end && self.fill("read")? == 0 {
                return Err(CommunicationError::io(
                    "read",
                    ErrorKind::UnexpectedEof.into(),
                ));
            }
            let available = (self.end - self.start).min(buf.len() - filled);
            buf[filled..filled + available]
                .copy_from_slice(&self.buffer[self.start..self.start + available]);
            self.start += available;
            filled += available;
        }
        Ok(())
    }

    fn fill(&mut self, operation: &'static str) -> Result<usize, CommunicationError> {
        let streams = self
            .server
            .streams()
            .ok_or(CommunicationError::not_established(operation))?;
        let read = read_retrying(streams.input, &mut self.buffer).during(operation)?;
        self.start = 0;
        self.end = read;
        Ok(read)
    }
}

fn read_retrying(input: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match input.read(buf) {
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

impl<S: ServerConnection> Drop for Connection<S> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl<S: ServerConnection> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("established", &self.established)
            .field("buffered", &(self.end - self.start))
            .finish_non_exhaustive()
    }
}
