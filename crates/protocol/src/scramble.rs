//! The pserver password scrambling table.
//!
//! CVS obfuscates pserver passwords with a fixed byte substitution. It is not
//! encryption; the table is public and every CVS client and server carries the
//! same copy. The table is an involution (`SCRAMBLE_TABLE[SCRAMBLE_TABLE[b]] ==
//! b`), so the same lookup both scrambles and descrambles.

use crate::error::ScrambleError;

/// Leading character identifying the cipher revision of a scrambled password.
pub const SCRAMBLE_VERSION_TAG: char = 'A';

/// Substitution table shared with every CVS pserver implementation.
///
/// Control characters map to themselves; the printable and high halves are
/// permuted.
#[rustfmt::skip]
pub const SCRAMBLE_TABLE: [u8; 256] = [
      0,   1,   2,   3,   4,   5,   6,   7,   8,   9,  10,  11,  12,  13,  14,  15,
     16,  17,  18,  19,  20,  21,  22,  23,  24,  25,  26,  27,  28,  29,  30,  31,
    114, 120,  53,  79,  96, 109,  72, 108,  70,  64,  76,  67, 116,  74,  68,  87,
    111,  52,  75, 119,  49,  34,  82,  81,  95,  65, 112,  86, 118, 110, 122, 105,
     41,  57,  83,  43,  46, 102,  40,  89,  38, 103,  45,  50,  42, 123,  91,  35,
    125,  55,  54,  66, 124, 126,  59,  47,  92,  71, 115,  78,  88, 107, 106,  56,
     36, 121, 117, 104, 101, 100,  69,  73,  99,  63,  94,  93,  39,  37,  61,  48,
     58, 113,  32,  90,  44,  98,  60,  51,  33,  97,  62,  77,  84,  80,  85, 223,
    225, 216, 187, 166, 229, 189, 222, 188, 141, 249, 148, 200, 184, 136, 248, 190,
    199, 170, 181, 204, 138, 232, 218, 183, 255, 234, 220, 247, 213, 203, 226, 193,
    174, 172, 228, 252, 217, 201, 131, 230, 197, 211, 145, 238, 161, 179, 160, 212,
    207, 221, 254, 173, 202, 146, 224, 151, 140, 196, 205, 130, 135, 133, 143, 246,
    192, 159, 244, 239, 185, 168, 215, 144, 139, 165, 180, 157, 147, 186, 214, 176,
    227, 231, 219, 169, 175, 156, 206, 198, 129, 164, 150, 210, 154, 177, 134, 127,
    182, 128, 158, 208, 162, 132, 167, 209, 149, 241, 153, 251, 237, 236, 171, 195,
    243, 233, 253, 240, 194, 250, 191, 155, 142, 137, 245, 235, 163, 242, 178, 152,
];

/// Substitutes a single byte through [`SCRAMBLE_TABLE`].
#[inline]
#[must_use]
pub const fn scramble_byte(byte: u8) -> u8 {
    SCRAMBLE_TABLE[byte as usize]
}

/// Scrambles `password` for transmission in a pserver authentication request.
///
/// The result starts with [`SCRAMBLE_VERSION_TAG`] followed by one character
/// per input character. Output characters are Latin-1 code points; callers
/// writing them to the wire must encode each as a single byte (see
/// [`crate::write_auth_request`]).
///
/// # Errors
///
/// Returns [`ScrambleError::InvalidCharacter`] when a character lies outside
/// `U+0000..=U+00FF`.
///
/// # Examples
///
/// ```
/// use protocol::scramble;
///
/// assert_eq!(scramble("").unwrap(), "A");
/// assert!(scramble("\u{12c}").is_err());
/// ```
pub fn scramble(password: &str) -> Result<String, ScrambleError> {
    let mut scrambled = String::with_capacity(password.len() + 1);
    scrambled.push(SCRAMBLE_VERSION_TAG);
    for (position, ch) in password.chars().enumerate() {
        let byte = u8::try_from(u32::from(ch))
            .map_err(|_| ScrambleError::InvalidCharacter { ch, position })?;
        scrambled.push(char::from(scramble_byte(byte)));
    }
    Ok(scrambled)
}

/// Reverses [`scramble`], stripping the version tag.
///
/// # Errors
///
/// Fails when the input is empty, carries an unknown version tag, or contains
/// characters outside the Latin-1 range.
pub fn descramble(scrambled: &str) -> Result<String, ScrambleError> {
    let mut chars = scrambled.chars();
    match chars.next() {
        Some(SCRAMBLE_VERSION_TAG) => {}
        Some(tag) => return Err(ScrambleError::UnknownVersion { tag }),
        None => return Err(ScrambleError::MissingVersion),
    }

    let mut plain = String::with_capacity(scrambled.len());
    for (position, ch) in chars.enumerate() {
        let byte = u8::try_from(u32::from(ch))
            .map_err(|_| ScrambleError::InvalidCharacter { ch, position })?;
        plain.push(char::from(scramble_byte(byte)));
    }
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_password_yields_only_the_tag() {
        assert_eq!(scramble("").unwrap(), "A");
    }

    #[test]
    fn matches_reference_cvs_output() {
        // `cvs login` stores this value in ~/.cvspass for "anonymous".
        assert_eq!(scramble("anonymous").unwrap(), "Ay=0=a%0bZ");
    }

    #[test]
    fn every_output_code_comes_from_the_table() {
        let input: String = (0u8..=255).map(char::from).collect();
        let scrambled = scramble(&input).unwrap();
        let codes: Vec<u32> = scrambled.chars().skip(1).map(u32::from).collect();
        let expected: Vec<u32> = (0u8..=255)
            .map(|byte| u32::from(SCRAMBLE_TABLE[byte as usize]))
            .collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn scrambling_is_deterministic() {
        assert_eq!(scramble("s3cr3t!").unwrap(), scramble("s3cr3t!").unwrap());
    }

    #[test]
    fn rejects_code_point_outside_latin1() {
        let error = scramble("ab\u{12c}").unwrap_err();
        assert_eq!(
            error,
            ScrambleError::InvalidCharacter {
                ch: '\u{12c}',
                position: 2
            }
        );
        assert_eq!(error.invalid_character(), Some('\u{12c}'));
    }

    #[test]
    fn accepts_latin1_high_half() {
        let scrambled = scramble("\u{e9}").unwrap();
        assert_eq!(scrambled.chars().nth(1), Some(char::from(SCRAMBLE_TABLE[0xe9])));
    }

    #[test]
    fn table_is_a_permutation() {
        let mut seen = [false; 256];
        for &value in &SCRAMBLE_TABLE {
            assert!(!seen[value as usize], "duplicate entry {value}");
            seen[value as usize] = true;
        }
    }

    #[test]
    fn descramble_requires_a_version_tag() {
        assert_eq!(descramble(""), Err(ScrambleError::MissingVersion));
        assert_eq!(
            descramble("Zabc"),
            Err(ScrambleError::UnknownVersion { tag: 'Z' })
        );
    }

    proptest! {
        #[test]
        fn descramble_inverts_scramble(password in "[\\x00-\\xff]{0,32}") {
            let scrambled = scramble(&password).unwrap();
            prop_assert_eq!(descramble(&scrambled).unwrap(), password);
        }
    }
}
