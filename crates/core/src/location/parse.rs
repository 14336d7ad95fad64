use super::{LocationAddress, LocationError, ParsePhase, Port};
use crate::transport::MethodRegistry;

/// Parses `:method:[user[:password]@]host[#port]:root`.
///
/// The scan is a single left-to-right pass without escaping:
///
/// 1. the method sits between the leading `:` and the next `:` and must be
///    registered in `methods`;
/// 2. everything up to the first `@` after the method is `user[:password]`,
///    split at its first `:`;
/// 3. the host runs to the next `:` and may carry a `#port` suffix;
/// 4. the remainder is the repository path, even when it starts with digits.
///
/// A username given in the text is fixed, and so is a password given with it.
pub fn parse_location(text: &str, methods: &MethodRegistry) -> Result<LocationAddress, LocationError> {
    let rest = text
        .strip_prefix(':')
        .ok_or_else(|| LocationError::malformed(ParsePhase::Method, text))?;
    let (method, rest) = rest
        .split_once(':')
        .ok_or_else(|| LocationError::malformed(ParsePhase::Method, rest))?;
    if method.is_empty() {
        return Err(LocationError::malformed(ParsePhase::Method, method));
    }
    if !methods.contains(method) {
        return Err(LocationError::UnknownMethod {
            requested: method.to_owned(),
            known: methods.names(),
        });
    }

    let (credentials, rest) = match rest.find('@') {
        Some(at) => (Some(split_credentials(&rest[..at])?), &rest[at + 1..]),
        None => (None, rest),
    };

    let (host_part, after_host) = rest
        .split_once(':')
        .ok_or_else(|| LocationError::malformed(ParsePhase::Root, rest))?;
    let (host, port, root) = match host_part.split_once('#') {
        Some((host, port)) => (host, parse_port(port)?, after_host),
        None => (host_part, Port::Default, after_host),
    };
    if host.is_empty() || host.contains(['\n', '\r', '@']) {
        return Err(LocationError::malformed(ParsePhase::Host, host));
    }
    if root.is_empty() || root.contains(['\n', '\r']) {
        return Err(LocationError::malformed(ParsePhase::Root, root));
    }

    let mut builder = LocationAddress::builder(method, host, root).port(port);
    if let Some((user, password)) = credentials {
        builder = builder.user(user);
        if let Some(password) = password {
            builder = builder.password(password);
        }
    }
    builder.build()
}

/// Runs the full grammar without keeping the result.
pub fn check_location(text: &str, methods: &MethodRegistry) -> Result<(), LocationError> {
    parse_location(text, methods).map(drop)
}

fn split_credentials(segment: &str) -> Result<(&str, Option<&str>), LocationError> {
    let (user, password) = match segment.split_once(':') {
        Some((user, password)) => (user, Some(password)),
        None => (segment, None),
    };
    if user.is_empty() || user.contains(['\n', '\r']) {
        return Err(LocationError::malformed(ParsePhase::User, user));
    }
    if password.is_some_and(|password| password.contains(['\n', '\r'])) {
        return Err(LocationError::malformed(ParsePhase::Password, ""));
    }
    Ok((user, password))
}

fn parse_port(text: &str) -> Result<Port, LocationError> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(LocationError::malformed(ParsePhase::Port, text));
    }
    text.parse::<u16>()
        .map(Port::from_number)
        .map_err(|_| LocationError::malformed(ParsePhase::Port, text))
}
