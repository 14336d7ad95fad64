#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! Wire helpers for the CVS `pserver` protocol.
//!
//! The crate is split into two small modules that mirror the two halves of a
//! pserver login: the password scrambling table and the authentication
//! exchange that carries the scrambled password to the server. Neither module
//! touches sockets; callers hand in any [`std::io::Write`] or
//! [`std::io::BufRead`] implementation, which keeps the parsers testable
//! against in-memory buffers.
//!
//! # Examples
//!
//! Scramble a password the way `cvs login` does before sending it:
//!
//! ```
//! use protocol::{descramble, scramble};
//!
//! let scrambled = scramble("anonymous").expect("ASCII passwords scramble");
//! assert_eq!(scrambled, "Ay=0=a%0bZ");
//! assert_eq!(descramble(&scrambled).expect("tagged"), "anonymous");
//! ```
//!
//! Classify a server's answer to an authentication request:
//!
//! ```
//! use protocol::{AuthResponse, ResponseFraming, read_auth_response};
//! use std::io::Cursor;
//!
//! let mut reply = Cursor::new(&b"E bad password\nI HATE YOU\n"[..]);
//! let response = read_auth_response(&mut reply, ResponseFraming::ErrorMarked).unwrap();
//! assert_eq!(
//!     response,
//!     AuthResponse::Rejected {
//!         message: String::from("bad password")
//!     }
//! );
//! ```

mod error;
mod pserver;
mod scramble;

pub use error::ScrambleError;
pub use pserver::{
    AuthResponse, BEGIN_AUTH_REQUEST, DEFAULT_PSERVER_PORT, END_AUTH_REQUEST, ERROR_LINE_PREFIX,
    ERROR_ZERO_PREFIX, LOGIN_FAILED, LOGIN_OK, NO_SUCH_USER, ResponseFraming, latin1_to_string,
    read_auth_response, read_raw_line, write_auth_request,
};
pub use scramble::{SCRAMBLE_TABLE, SCRAMBLE_VERSION_TAG, descramble, scramble, scramble_byte};
