#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! Byte-stream plumbing shared by every CVS transport.
//!
//! # Overview
//!
//! Transports differ in how they reach a server: the pserver method dials a
//! TCP socket and authenticates, the ext method spawns a remote shell. Once
//! the server is reachable, the command layer only needs a duplex byte
//! stream. This crate draws that seam:
//!
//! - [`ServerConnection`] is implemented by transports. It knows how to open
//!   and tear down its stream and lends out the read and write halves.
//! - [`Connection`] wraps any [`ServerConnection`] with line framing, the
//!   open/closed state machine and the pending-input drain performed on close.
//! - [`ProgramCommand`] and [`ProgramStream`] spawn a child process and expose
//!   its stdio as a duplex stream for transports that shell out.
//!
//! # Invariants
//!
//! - Reads and writes on a closed [`Connection`] fail with
//!   [`CommunicationError::NotEstablished`] without touching the server.
//! - [`Connection::close`] always leaves the connection closed, even when the
//!   drain or the transport teardown fails.
//! - A [`ProgramStream`] never outlives its child: dropping it kills and reaps
//!   the process.

mod connection;
mod error;
mod program;
mod server;

pub use connection::Connection;
pub use error::CommunicationError;
pub use program::{EXIT_GRACE, ProgramCommand, ProgramExit, ProgramStream};
pub use server::{ServerConnection, ServerStreams};
