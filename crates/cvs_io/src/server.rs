use std::io::{self, Read, Write};

/// Borrowed read and write halves of an open server stream.
pub struct ServerStreams<'a> {
    /// Bytes sent by the server.
    pub input: &'a mut dyn Read,
    /// Bytes sent to the server.
    pub output: &'a mut dyn Write,
}

impl<'a> ServerStreams<'a> {
    /// Pairs an input and an output stream.
    pub fn new(input: &'a mut dyn Read, output: &'a mut dyn Write) -> Self {
        Self { input, output }
    }
}

/// A transport-specific duplex stream to a CVS server.
///
/// Implementations open their stream lazily in [`open`](Self::open) and may
/// be reopened after [`close`](Self::close).
pub trait ServerConnection {
    /// Error reported when opening fails.
    type Error;

    /// Establishes the stream, authenticating if the transport requires it.
    fn open(&mut self) -> Result<(), Self::Error>;

    /// Releases the stream. Must be safe to call on a closed connection.
    fn close(&mut self) -> io::Result<()>;

    /// Lends out the stream halves, or `None` while closed.
    fn streams(&mut self) -> Option<ServerStreams<'_>>;

    /// Discards input the server has already queued without blocking and
    /// returns the number of bytes thrown away.
    ///
    /// Transports that cannot poll their input keep the default, which drains
    /// nothing.
    fn drain_available(&mut self) -> io::Result<usize> {
        Ok(0)
    }
}

impl<T: ServerConnection + ?Sized> ServerConnection for Box<T> {
    type Error = T::Error;

    fn open(&mut self) -> Result<(), Self::Error> {
        (**self).open()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn streams(&mut self) -> Option<ServerStreams<'_>> {
        (**self).streams()
    }

    fn drain_available(&mut self) -> io::Result<usize> {
        (**self).drain_available()
    }
}
