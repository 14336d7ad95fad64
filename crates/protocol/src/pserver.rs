//! The pserver authentication exchange.
//!
//! A pserver login is a fixed sequence of lines written by the client,
//!
//! ```text
//! BEGIN AUTH REQUEST
//! <repository root>
//! <user>
//! <scrambled password>
//! END AUTH REQUEST
//! ```
//!
//! answered by the server with either `I LOVE YOU` or a run of diagnostic
//! lines that usually ends in `I HATE YOU`. This module writes the request and
//! classifies the reply; it never decides what a rejection means for retry
//! policy.

use std::io::{self, BufRead, Write};

/// Opening line of an authentication request.
pub const BEGIN_AUTH_REQUEST: &str = "BEGIN AUTH REQUEST";
/// Closing line of an authentication request.
pub const END_AUTH_REQUEST: &str = "END AUTH REQUEST";
/// Reply sent by the server when the credentials are accepted.
pub const LOGIN_OK: &str = "I LOVE YOU";
/// Reply sent by the server when the credentials are rejected.
pub const LOGIN_FAILED: &str = "I HATE YOU";
/// Prefix the server puts in front of diagnostic lines.
pub const ERROR_LINE_PREFIX: &str = "E ";
/// Prefix of generic server failures that carry no useful code.
pub const ERROR_ZERO_PREFIX: &str = "error 0 ";
/// Fragment identifying an unknown account in a refusal message.
pub const NO_SUCH_USER: &str = "no such user";
/// TCP port a pserver listens on unless told otherwise.
pub const DEFAULT_PSERVER_PORT: u16 = 2401;

/// Fallback message used when the server rejects a login without explanation.
const LOGIN_REFUSED: &str = "login refused";

/// How diagnostic lines preceding the verdict are collected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResponseFraming {
    /// Direct connections: only lines tagged with `E ` are diagnostics and the
    /// first untagged line ends the reply. Messages are joined with spaces.
    #[default]
    ErrorMarked,
    /// Tunnelled connections: every non-empty line is a diagnostic. Proxies
    /// tend to emit untagged text of their own, so messages are joined with
    /// newlines to keep their lines apart.
    Proxied,
}

impl ResponseFraming {
    const fn separator(self) -> char {
        match self {
            Self::ErrorMarked => ' ',
            Self::Proxied => '\n',
        }
    }
}

/// Classified server reply to an authentication request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AuthResponse {
    /// The server answered `I LOVE YOU`.
    Accepted,
    /// The server closed the stream or sent an empty first line.
    NoResponse,
    /// The server answered `I HATE YOU`; new credentials may succeed.
    Rejected {
        /// Collected diagnostics, or `login refused` when there were none.
        message: String,
    },
    /// The refusal names an unknown account; new credentials may succeed.
    UnknownUser {
        /// Server message with any `error 0 ` prefix removed.
        message: String,
    },
    /// The server refused for a reason unrelated to the credentials.
    Refused {
        /// Server message with any `error 0 ` prefix removed.
        message: String,
    },
}

impl AuthResponse {
    /// Reports whether prompting for different credentials could help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::UnknownUser { .. })
    }
}

/// Writes a complete authentication request and flushes `writer`.
///
/// `scrambled_password` is the output of [`crate::scramble`]. Its characters
/// are Latin-1 code points and are written one byte each; root and user are
/// written as UTF-8.
///
/// # Errors
///
/// Propagates write and flush failures. Characters in the scrambled password
/// above `U+00FF` are reported as [`io::ErrorKind::InvalidInput`].
pub fn write_auth_request<W: Write + ?Sized>(
    writer: &mut W,
    root: &str,
    user: &str,
    scrambled_password: &str,
) -> io::Result<()> {
    let mut request = Vec::with_capacity(
        BEGIN_AUTH_REQUEST.len()
            + END_AUTH_REQUEST.len()
            + root.len()
            + user.len()
            + scrambled_password.len()
            + 5,
    );
    push_line(&mut request, BEGIN_AUTH_REQUEST.as_bytes());
    push_line(&mut request, root.as_bytes());
    push_line(&mut request, user.as_bytes());
    for ch in scrambled_password.chars() {
        let byte = u8::try_from(u32::from(ch)).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "scrambled password contains a character outside Latin-1",
            )
        })?;
        request.push(byte);
    }
    request.push(b'\n');
    push_line(&mut request, END_AUTH_REQUEST.as_bytes());

    writer.write_all(&request)?;
    writer.flush()
}

fn push_line(buffer: &mut Vec<u8>, line: &[u8]) {
    buffer.extend_from_slice(line);
    buffer.push(b'\n');
}

/// Decodes bytes as ISO-8859-1, mapping each byte to the code point of the
/// same value.
#[must_use]
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Reads one `\n`-terminated line and decodes it as Latin-1.
///
/// The terminator is not part of the result. Returns `Ok(None)` when the
/// stream is already at end of file; a final line without terminator is
/// returned as-is.
///
/// # Errors
///
/// Propagates read failures from `reader`.
pub fn read_raw_line<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if line.last() == Some(&b'\n') {
        line.pop();
    }
    Ok(Some(latin1_to_string(&line)))
}

/// Reads and classifies the server's reply to an authentication request.
///
/// End of file and an empty first line both yield
/// [`AuthResponse::NoResponse`]. Diagnostic lines are collected according to
/// `framing` with their `E ` tags removed; a terminating `I HATE YOU` produces
/// [`AuthResponse::Rejected`]. Any other terminating line is appended to the
/// collected diagnostics, stripped of a leading `error 0 `, and classified as
/// [`AuthResponse::UnknownUser`] when it mentions `no such user` and as
/// [`AuthResponse::Refused`] otherwise.
///
/// # Errors
///
/// Propagates read failures from `reader`.
pub fn read_auth_response<R: BufRead + ?Sized>(
    reader: &mut R,
    framing: ResponseFraming,
) -> io::Result<AuthResponse> {
    let Some(first) = read_raw_line(reader)? else {
        return Ok(AuthResponse::NoResponse);
    };
    if first == LOGIN_OK {
        return Ok(AuthResponse::Accepted);
    }
    if first.is_empty() {
        return Ok(AuthResponse::NoResponse);
    }

    let mut collected = String::new();
    let mut current = Some(first);
    let terminal = loop {
        let Some(line) = current.take() else {
            break String::new();
        };
        if line == LOGIN_FAILED {
            let message = if collected.is_empty() {
                String::from(LOGIN_REFUSED)
            } else {
                collected
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(target: "cvs::auth", %message, "pserver rejected credentials");
            return Ok(AuthResponse::Rejected { message });
        }
        let diagnostic = match framing {
            ResponseFraming::ErrorMarked => line.strip_prefix(ERROR_LINE_PREFIX).map(str::to_owned),
            ResponseFraming::Proxied if line.is_empty() => None,
            ResponseFraming::Proxied => Some(
                line.strip_prefix(ERROR_LINE_PREFIX)
                    .map_or_else(|| line.clone(), str::to_owned),
            ),
        };
        match diagnostic {
            Some(text) => {
                if !collected.is_empty() {
                    collected.push(framing.separator());
                }
                collected.push_str(&text);
                current = read_raw_line(reader)?;
            }
            None => break line,
        }
    };

    let terminal = terminal
        .strip_prefix(ERROR_ZERO_PREFIX)
        .unwrap_or(&terminal);
    let mut message = collected;
    if !terminal.is_empty() {
        if !message.is_empty() {
            message.push(framing.separator());
        }
        message.push_str(terminal);
    }

    if message.contains(NO_SUCH_USER) {
        Ok(AuthResponse::UnknownUser { message })
    } else {
        Ok(AuthResponse::Refused { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn classify(reply: &[u8], framing: ResponseFraming) -> AuthResponse {
        read_auth_response(&mut Cursor::new(reply), framing).expect("in-memory read")
    }

    #[test]
    fn request_layout_matches_protocol() {
        let mut wire = Vec::new();
        write_auth_request(&mut wire, "/cvsroot", "anonymous", "A").unwrap();
        assert_eq!(
            wire,
            b"BEGIN AUTH REQUEST\n/cvsroot\nanonymous\nA\nEND AUTH REQUEST\n"
        );
    }

    #[test]
    fn scrambled_high_half_is_written_as_single_bytes() {
        let scrambled = crate::scramble("\u{e9}").unwrap();
        let mut wire = Vec::new();
        write_auth_request(&mut wire, "/r", "u", &scrambled).unwrap();
        let expected_byte = crate::SCRAMBLE_TABLE[0xe9];
        assert!(wire.windows(3).any(|w| w == [b'A', expected_byte, b'\n']));
    }

    #[test]
    fn write_rejects_wide_characters() {
        let mut wire = Vec::new();
        let error = write_auth_request(&mut wire, "/r", "u", "A\u{400}").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidInput);
        assert!(wire.is_empty());
    }

    #[test]
    fn accepted_reply() {
        assert_eq!(
            classify(b"I LOVE YOU\n", ResponseFraming::ErrorMarked),
            AuthResponse::Accepted
        );
    }

    #[test]
    fn end_of_stream_is_no_response() {
        assert_eq!(
            classify(b"", ResponseFraming::ErrorMarked),
            AuthResponse::NoResponse
        );
        assert_eq!(
            classify(b"\n", ResponseFraming::Proxied),
            AuthResponse::NoResponse
        );
    }

    #[test]
    fn rejection_collects_error_lines() {
        assert_eq!(
            classify(b"E bad password\nI HATE YOU\n", ResponseFraming::ErrorMarked),
            AuthResponse::Rejected {
                message: String::from("bad password")
            }
        );
        assert_eq!(
            classify(
                b"E first\nE second\nI HATE YOU\n",
                ResponseFraming::ErrorMarked
            ),
            AuthResponse::Rejected {
                message: String::from("first second")
            }
        );
    }

    #[test]
    fn bare_rejection_reports_login_refused() {
        let response = classify(b"I HATE YOU\n", ResponseFraming::ErrorMarked);
        assert_eq!(
            response,
            AuthResponse::Rejected {
                message: String::from("login refused")
            }
        );
        assert!(response.is_retryable());
    }

    #[test]
    fn unknown_user_is_retryable() {
        let response = classify(
            b"error 0 no such user alice in CVSROOT/passwd\n",
            ResponseFraming::ErrorMarked,
        );
        assert_eq!(
            response,
            AuthResponse::UnknownUser {
                message: String::from("no such user alice in CVSROOT/passwd")
            }
        );
        assert!(response.is_retryable());
    }

    #[test]
    fn other_failures_are_refusals() {
        let response = classify(
            b"E Fatal error, aborting.\ncvs [server aborted]: root not allowed\n",
            ResponseFraming::ErrorMarked,
        );
        assert_eq!(
            response,
            AuthResponse::Refused {
                message: String::from("Fatal error, aborting. cvs [server aborted]: root not allowed")
            }
        );
        assert!(!response.is_retryable());
    }

    #[test]
    fn proxied_replies_keep_untagged_lines() {
        assert_eq!(
            classify(
                b"HTTP/1.0 200 OK\nE bad password\nI HATE YOU\n",
                ResponseFraming::Proxied
            ),
            AuthResponse::Rejected {
                message: String::from("HTTP/1.0 200 OK\nbad password")
            }
        );
        assert_eq!(
            classify(b"proxy says no\n\n", ResponseFraming::Proxied),
            AuthResponse::Refused {
                message: String::from("proxy says no")
            }
        );
    }

    #[test]
    fn raw_lines_decode_latin1_and_keep_carriage_returns() {
        let mut reader = Cursor::new(&b"caf\xe9\r\nlast"[..]);
        assert_eq!(
            read_raw_line(&mut reader).unwrap().as_deref(),
            Some("caf\u{e9}\r")
        );
        assert_eq!(read_raw_line(&mut reader).unwrap().as_deref(), Some("last"));
        assert_eq!(read_raw_line(&mut reader).unwrap(), None);
    }
}
