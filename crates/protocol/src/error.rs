use thiserror::Error;

/// Errors produced by the pserver password scrambler.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ScrambleError {
    /// The password contains a character outside the table's Latin-1 domain.
    ///
    /// The scrambling table only covers code points `0..=255`; anything wider
    /// cannot be represented on the wire.
    #[error("password character {ch:?} at position {position} cannot be sent to a pserver")]
    InvalidCharacter {
        /// The rejected character.
        ch: char,
        /// Zero-based character index within the password.
        position: usize,
    },
    /// The scrambled text does not start with a known cipher version tag.
    #[error("scrambled password uses unknown cipher version {tag:?}")]
    UnknownVersion {
        /// The leading character that was found instead of the tag.
        tag: char,
    },
    /// The scrambled text is empty and therefore lacks a version tag.
    #[error("scrambled password is empty")]
    MissingVersion,
}

impl ScrambleError {
    /// Returns the offending character when the error is a domain violation.
    #[must_use]
    pub const fn invalid_character(&self) -> Option<char> {
        match self {
            Self::InvalidCharacter { ch, .. } => Some(*ch),
            _ => None,
        }
    }
}
