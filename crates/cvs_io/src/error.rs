use std::io;

use thiserror::Error;

/// Failure of an I/O operation on a [`crate::Connection`].
#[derive(Debug, Error)]
pub enum CommunicationError {
    /// The operation was attempted while the connection was closed.
    #[error("cannot {operation}: connection is not established")]
    NotEstablished {
        /// Name of the rejected operation.
        operation: &'static str,
    },
    /// The underlying stream reported an error.
    #[error("failed to {operation} on server connection: {source}")]
    Io {
        /// Name of the failed operation.
        operation: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl CommunicationError {
    pub(crate) const fn not_established(operation: &'static str) -> Self {
        Self::NotEstablished { operation }
    }

    pub(crate) const fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// Returns the name of the operation that failed.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::NotEstablished { operation } | Self::Io { operation, .. } => operation,
        }
    }

    /// Returns the I/O error kind when the failure came from the stream.
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            Self::NotEstablished { .. } => None,
        }
    }
}

/// Attaches an operation name to I/O results.
pub(crate) trait IoResultExt<T> {
    fn during(self, operation: &'static str) -> Result<T, CommunicationError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn during(self, operation: &'static str) -> Result<T, CommunicationError> {
        self.map_err(|source| CommunicationError::io(operation, source))
    }
}
