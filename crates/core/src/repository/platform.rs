//! Server platform classification from a version probe.

use std::fmt;

/// Kind of server behind a location, as far as it is known.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ServerPlatform {
    /// No probe has classified the server yet.
    #[default]
    Undetermined,
    /// A regular CVS server.
    CvsServer,
    /// A CVSNT server.
    CvsntServer,
    /// A server whose version is too old to be supported.
    UnsupportedServer,
    /// A server that did not identify itself.
    UnknownServer,
}

impl fmt::Display for ServerPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Undetermined => "undetermined",
            Self::CvsServer => "CVS",
            Self::CvsntServer => "CVSNT",
            Self::UnsupportedServer => "unsupported",
            Self::UnknownServer => "unknown",
        })
    }
}

/// Severity of a probe status.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StatusSeverity {
    /// Nothing to report.
    #[default]
    Ok,
    /// Informational.
    Info,
    /// Something the user should know about.
    Warning,
    /// The probe failed.
    Error,
}

/// Well-known status codes produced by a version probe.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum StatusCode {
    /// No particular code.
    #[default]
    Unspecified,
    /// The server identified itself as CVSNT.
    ServerIsCvsnt,
    /// The server version is too old.
    UnsupportedServerVersion,
    /// The server did not identify itself.
    ServerIsUnknown,
    /// Any other code.
    Other(i32),
}

impl StatusCode {
    const fn platform(self) -> Option<ServerPlatform> {
        match self {
            Self::ServerIsCvsnt => Some(ServerPlatform::CvsntServer),
            Self::UnsupportedServerVersion => Some(ServerPlatform::UnsupportedServer),
            Self::ServerIsUnknown => Some(ServerPlatform::UnknownServer),
            Self::Unspecified | Self::Other(_) => None,
        }
    }
}

/// Structured outcome of a version probe, possibly with nested children.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProbeStatus {
    severity: StatusSeverity,
    code: StatusCode,
    message: String,
    children: Vec<ProbeStatus>,
}

impl ProbeStatus {
    /// A successful probe.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A status with the given severity, code and message.
    pub fn new(severity: StatusSeverity, code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            children: Vec::new(),
        }
    }

    /// Appends a child status. The parent's severity rises to the child's if
    /// the child is more severe.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.severity = self.severity.max(child.severity);
        self.children.push(child);
        self
    }

    /// Severity.
    #[must_use]
    pub const fn severity(&self) -> StatusSeverity {
        self.severity
    }

    /// Code.
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        self.code
    }

    /// Message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Nested statuses.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    /// Reports whether the probe succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.severity == StatusSeverity::Ok
    }

    /// Classifies the server that produced this status.
    ///
    /// An OK status means a regular CVS server. Otherwise the first child
    /// carrying a platform code decides, then the status's own code; anything
    /// else leaves the platform undetermined.
    #[must_use]
    pub fn platform(&self) -> ServerPlatform {
        if self.is_ok() {
            return ServerPlatform::CvsServer;
        }
        self.children
            .iter()
            .find_map(|child| child.code.platform())
            .or_else(|| self.code.platform())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_is_a_plain_cvs_server() {
        assert_eq!(ProbeStatus::ok().platform(), ServerPlatform::CvsServer);
    }

    #[test]
    fn codes_map_to_platforms() {
        for (code, platform) in [
            (StatusCode::ServerIsCvsnt, ServerPlatform::CvsntServer),
            (StatusCode::UnsupportedServerVersion, ServerPlatform::UnsupportedServer),
            (StatusCode::ServerIsUnknown, ServerPlatform::UnknownServer),
            (StatusCode::Other(42), ServerPlatform::Undetermined),
        ] {
            let status = ProbeStatus::new(StatusSeverity::Info, code, "probe");
            assert_eq!(status.platform(), platform, "{code:?}");
        }
    }

    #[test]
    fn children_are_searched_first() {
        let status = ProbeStatus::new(StatusSeverity::Ok, StatusCode::ServerIsUnknown, "version")
            .with_child(ProbeStatus::new(StatusSeverity::Info, StatusCode::Unspecified, "banner"))
            .with_child(ProbeStatus::new(
                StatusSeverity::Warning,
                StatusCode::ServerIsCvsnt,
                "CVSNT 2.5",
            ));
        assert_eq!(status.severity(), StatusSeverity::Warning);
        assert_eq!(status.platform(), ServerPlatform::CvsntServer);
    }

    #[test]
    fn error_without_platform_is_undetermined() {
        let status = ProbeStatus::new(StatusSeverity::Error, StatusCode::Unspecified, "failed");
        assert_eq!(status.platform(), ServerPlatform::Undetermined);
    }
}
