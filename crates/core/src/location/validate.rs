use super::{LocationError, check_location};
use crate::transport::MethodRegistry;

/// Outcome of [`validate_location`].
pub type ValidationResult = Result<(), LocationError>;

/// Checks a location string, reporting common mistakes before grammar errors.
///
/// Cheap structural checks run first so that typical input errors get a
/// specific diagnostic: empty text, trailing whitespace, a missing `:method:`
/// prefix, and empty user, host or path segments. Text that passes is then run
/// through the full parser.
pub fn validate_location(text: &str, methods: &MethodRegistry) -> ValidationResult {
    if text.is_empty() {
        return Err(LocationError::Empty);
    }
    if text.ends_with([' ', '\t']) {
        return Err(LocationError::TrailingWhitespace);
    }
    let Some(second_colon) = text
        .strip_prefix(':')
        .and_then(|rest| rest.find(':'))
        .map(|index| index + 1)
    else {
        return Err(LocationError::MissingLeadingColon);
    };

    let after_method = second_colon + 1;
    let host_start = match text[after_method..].find('@') {
        Some(at) => {
            if at == 0 {
                return Err(LocationError::IncompleteLocation);
            }
            after_method + at + 1
        }
        None => after_method,
    };
    let Some(colon) = text[host_start..].find(':').map(|index| host_start + index) else {
        return Err(LocationError::IncompleteLocation);
    };
    if colon == host_start || colon + 1 == text.len() {
        return Err(LocationError::IncompleteLocation);
    }

    check_location(text, methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ParsePhase;

    fn validate(text: &str) -> ValidationResult {
        validate_location(text, &MethodRegistry::default())
    }

    #[test]
    fn accepts_well_formed_locations() {
        assert_eq!(validate(":pserver:anonymous@cvs.example.org:/cvsroot"), Ok(()));
        assert_eq!(validate(":ext:host#22:/var/cvs"), Ok(()));
    }

    #[test]
    fn structural_checks_run_first() {
        assert_eq!(validate(""), Err(LocationError::Empty));
        assert_eq!(
            validate(":pserver:host:/cvs "),
            Err(LocationError::TrailingWhitespace)
        );
        assert_eq!(
            validate(":pserver:host:/cvs\t"),
            Err(LocationError::TrailingWhitespace)
        );
        assert_eq!(
            validate("pserver:host:/cvs"),
            Err(LocationError::MissingLeadingColon)
        );
        assert_eq!(validate(":pserver"), Err(LocationError::MissingLeadingColon));
    }

    #[test]
    fn empty_segments_are_incomplete() {
        assert_eq!(
            validate(":pserver:@host:/cvs"),
            Err(LocationError::IncompleteLocation)
        );
        assert_eq!(
            validate(":pserver:bob@:/cvs"),
            Err(LocationError::IncompleteLocation)
        );
        assert_eq!(
            validate(":pserver:host:"),
            Err(LocationError::IncompleteLocation)
        );
        assert_eq!(
            validate(":pserver:host"),
            Err(LocationError::IncompleteLocation)
        );
    }

    #[test]
    fn grammar_errors_come_from_the_parser() {
        assert_eq!(
            validate(":pserver:host#port:/cvs").unwrap_err().phase(),
            Some(ParsePhase::Port)
        );
        assert!(matches!(
            validate(":kserver:host:/cvs"),
            Err(LocationError::UnknownMethod { .. })
        ));
    }
}
