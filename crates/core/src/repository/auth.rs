//! Connection establishment with the prompt-and-retry authentication loop.

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::RepositoryLocation;
use super::platform::{ProbeStatus, ServerPlatform};
use crate::error::{AuthenticationError, AuthenticationFailure, CvsError};
use crate::location::LocationError;
use crate::transport::{ConnectRequest, Connection, Monitor};

impl RepositoryLocation {
    /// Opens an authenticated connection to the server.
    ///
    /// When both username and password are already known a single attempt is
    /// made. Otherwise the location is registered as known and the loop
    /// consults the credential store, connects, and on a retryable
    /// authentication failure asks the prompter for new credentials before
    /// trying again. Only the user ends the loop, by cancelling the prompt.
    ///
    /// # Errors
    ///
    /// - [`CvsError::Authentication`] when credentials were rejected and no
    ///   prompter is configured, or the prompt was cancelled; the message is
    ///   the last server message.
    /// - [`CvsError::Cancelled`] when `monitor` is cancelled.
    /// - Transport and store failures end the loop immediately.
    pub fn open_connection(&mut self, monitor: &Monitor) -> Result<Connection, CvsError> {
        if let (Some(username), Some(password)) = (self.known_username(), self.known_password()) {
            let username = username.to_owned();
            let password = Zeroizing::new(password.to_owned());
            debug!(target: "cvs::auth", location = %self, "credentials known, connecting once");
            return self.connect(&username, &password, monitor);
        }

        self.services().known_locations().ensure_known(self.location());
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if monitor.is_cancelled() {
                return Err(CvsError::Cancelled);
            }

            let stored = self.retrieve_password()?;
            let outcome = match self.known_username().map(str::to_owned) {
                None => Err(CvsError::from(AuthenticationError::new(
                    AuthenticationFailure::UsernameRequired,
                    "username required",
                ))),
                Some(username) => {
                    let password = self.attempt_password(stored);
                    debug!(
                        target: "cvs::auth",
                        location = %self,
                        attempt,
                        user = %username,
                        "authentication attempt"
                    );
                    self.connect(&username, &password, monitor)
                }
            };

            let failure = match outcome {
                Ok(connection) => {
                    info!(target: "cvs::auth", location = %self, attempt, "authenticated");
                    return Ok(connection);
                }
                Err(CvsError::Authentication(error)) if error.is_retryable() => error,
                Err(error) => return Err(error),
            };
            debug!(
                target: "cvs::auth",
                location = %self,
                attempt,
                message = failure.message(),
                "authentication failed"
            );

            let Some(prompter) = self.services().prompter() else {
                return Err(AuthenticationError::new(
                    AuthenticationFailure::NoAuthenticator,
                    failure.message(),
                )
                .into());
            };
            let mut failure = failure;
            loop {
                let mut info = self.user_info(false);
                if prompter.prompt(&*self, &mut info, failure.message()).is_err() {
                    debug!(target: "cvs::auth", location = %self, "credential prompt cancelled");
                    return Err(AuthenticationError::cancelled(&failure).into());
                }
                self.set_user_info(&info)?;
                match self.unscramblable_password() {
                    Some(error) => {
                        debug!(target: "cvs::auth", location = %self, "prompted password cannot be scrambled");
                        failure = error;
                    }
                    None => break,
                }
            }
            self.update_cache()?;
        }
    }

    /// Reports an in-memory password that neither the pserver wire format nor
    /// the credential store can carry.
    fn unscramblable_password(&self) -> Option<AuthenticationError> {
        let password = self.known_password()?;
        protocol::scramble(password).err().map(|error| {
            AuthenticationError::invalid_character(
                error
                    .invalid_character()
                    .unwrap_or(char::REPLACEMENT_CHARACTER),
            )
        })
    }

    /// Opens a connection, runs `probe` on it and closes it again.
    ///
    /// The probe stands in for the server version query; its status decides
    /// the recorded [`ServerPlatform`]. A CVSNT server addressed with a plain
    /// `/` root is refused. Any failure forgets the cached credentials.
    ///
    /// # Errors
    ///
    /// Whatever [`open_connection`](Self::open_connection) or the probe
    /// reports, plus [`AuthenticationFailure::UnsupportedServer`].
    pub fn validate_connection<F>(&mut self, monitor: &Monitor, probe: F) -> Result<(), CvsError>
    where
        F: FnOnce(&mut Connection) -> Result<ProbeStatus, CvsError>,
    {
        let outcome = self.probe_server(monitor, probe);
        if let Err(error) = &outcome {
            debug!(target: "cvs::auth", location = %self, %error, "validation failed");
            if let Err(forget) = self.dispose() {
                warn!(target: "cvs::auth", location = %self, error = %forget, "could not forget credentials");
            }
        }
        outcome
    }

    fn probe_server<F>(&mut self, monitor: &Monitor, probe: F) -> Result<(), CvsError>
    where
        F: FnOnce(&mut Connection) -> Result<ProbeStatus, CvsError>,
    {
        let mut connection = self.open_connection(monitor)?;
        let status = probe(&mut connection);
        let closed = connection.close();
        let status = status?;
        closed?;

        if !status.is_ok() {
            warn!(
                target: "cvs::connection",
                location = %self,
                severity = ?status.severity(),
                message = status.message(),
                "server version probe reported a problem"
            );
        }
        self.set_server_platform(&status);
        if self.server_platform() == ServerPlatform::CvsntServer && self.root().starts_with('/') {
            return Err(AuthenticationError::new(
                AuthenticationFailure::UnsupportedServer,
                format!(
                    "{} is a CVSNT server; CVSNT repositories must be addressed with a repository prefix, not '{}'",
                    self.host(),
                    self.root()
                ),
            )
            .into());
        }
        Ok(())
    }

    fn attempt_password(&self, stored: Option<Zeroizing<String>>) -> Zeroizing<String> {
        if self.is_password_fixed() {
            return Zeroizing::new(self.known_password().unwrap_or_default().to_owned());
        }
        stored
            .or_else(|| self.known_password().map(|password| Zeroizing::new(password.to_owned())))
            .unwrap_or_else(|| Zeroizing::new(String::new()))
    }

    fn connect(
        &self,
        username: &str,
        password: &str,
        monitor: &Monitor,
    ) -> Result<Connection, CvsError> {
        let methods = self.services().methods();
        let method = methods
            .get(self.method())
            .ok_or_else(|| LocationError::UnknownMethod {
                requested: self.method().to_owned(),
                known: methods.names(),
            })?;
        let request = ConnectRequest {
            address: self.address(),
            username,
            password,
            options: self.services().options(),
            monitor,
        };
        let mut connection = Connection::new(method.create_connection(&request)?);
        connection.open()?;
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        AuthInfo, CREDENTIAL_REALM, CredentialStore, KnownLocationSet, LocationServices,
        MemoryCredentialStore, PromptCancelled, Prompter, StatusCode, StatusSeverity, UserInfo,
    };
    use crate::transport::{BoxedServerConnection, ConnectionMethod, MethodRegistry};
    use cvs_io::{ServerConnection, ServerStreams};
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    #[derive(Default)]
    struct Recorded {
        attempts: Mutex<Vec<(String, String)>>,
    }

    /// Accepts only `alice`/`secret`; anything else is rejected.
    struct FakeMethod {
        recorded: Arc<Recorded>,
        refuse: bool,
    }

    struct FakeServer {
        accepted: bool,
        refuse: bool,
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl ServerConnection for FakeServer {
        type Error = CvsError;

        fn open(&mut self) -> Result<(), CvsError> {
            if self.refuse {
                return Err(crate::error::transport_error("connection refused: no route"));
            }
            if self.accepted {
                Ok(())
            } else {
                Err(AuthenticationError::rejected("bad password").into())
            }
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn streams(&mut self) -> Option<ServerStreams<'_>> {
            Some(ServerStreams::new(&mut self.input, &mut self.output))
        }
    }

    impl ConnectionMethod for FakeMethod {
        fn name(&self) -> &str {
            "pserver"
        }

        fn create_connection(
            &self,
            request: &ConnectRequest<'_>,
        ) -> Result<BoxedServerConnection, CvsError> {
            self.recorded
                .attempts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((request.username.to_owned(), request.password.to_owned()));
            Ok(Box::new(FakeServer {
                accepted: request.username == "alice" && request.password == "secret",
                refuse: self.refuse,
                input: Cursor::new(b"M Concurrent Versions System (CVS) 1.12.13\n".to_vec()),
                output: Vec::new(),
            }))
        }
    }

    struct ScriptedPrompter {
        answers: Mutex<Vec<(&'static str, &'static str)>>,
        calls: AtomicUsize,
    }

    impl ScriptedPrompter {
        fn new(answers: &[(&'static str, &'static str)]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn prompt(
            &self,
            _location: &RepositoryLocation,
            info: &mut UserInfo,
            _message: &str,
        ) -> Result<(), PromptCancelled> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (username, password) = self
                .answers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop()
                .ok_or(PromptCancelled)?;
            info.set_username(username);
            info.set_password(password);
            Ok(())
        }
    }

    struct Fixture {
        recorded: Arc<Recorded>,
        store: Arc<MemoryCredentialStore>,
        known: Arc<KnownLocationSet>,
    }

    fn services(refuse: bool, prompter: Option<Arc<ScriptedPrompter>>) -> (LocationServices, Fixture) {
        let recorded = Arc::new(Recorded::default());
        let mut methods = MethodRegistry::default();
        methods.register(Arc::new(FakeMethod {
            recorded: Arc::clone(&recorded),
            refuse,
        }));
        let store = Arc::new(MemoryCredentialStore::new());
        let known = Arc::new(KnownLocationSet::new());
        let mut services = LocationServices::default()
            .with_methods(methods)
            .with_credential_store(store.clone())
            .with_known_locations(known.clone());
        if let Some(prompter) = prompter {
            services = services.with_prompter(prompter);
        }
        (
            services,
            Fixture {
                recorded,
                store,
                known,
            },
        )
    }

    fn attempts(fixture: &Fixture) -> Vec<(String, String)> {
        fixture
            .recorded
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    const LOCATION: &str = ":pserver:cvs.example.org:/cvsroot";

    #[test]
    fn known_credentials_connect_once() {
        let (services, fixture) = services(false, None);
        let mut location =
            RepositoryLocation::from_text(":pserver:alice:secret@cvs.example.org:/cvsroot", services)
                .expect("location");
        let mut connection = location.open_connection(&Monitor::new()).expect("connect");
        assert!(connection.is_established());
        assert_eq!(
            connection.read_line().expect("greeting"),
            "M Concurrent Versions System (CVS) 1.12.13"
        );
        assert_eq!(attempts(&fixture).len(), 1);
        assert!(fixture.known.locations().is_empty());
    }

    #[test]
    fn prompt_answers_are_cached_and_retried() {
        let prompter = Arc::new(ScriptedPrompter::new(&[("alice", "wrong"), ("alice", "secret")]));
        let (services, fixture) = services(false, Some(prompter.clone()));
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");

        location.open_connection(&Monitor::new()).expect("connect");

        assert_eq!(prompter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            attempts(&fixture),
            vec![
                ("alice".to_owned(), "wrong".to_owned()),
                ("alice".to_owned(), "secret".to_owned()),
            ]
        );
        let cached = fixture
            .store
            .get(LOCATION, CREDENTIAL_REALM)
            .unwrap()
            .expect("cached entry");
        assert_eq!(cached.password(), Some("secret"));
        assert!(fixture.known.contains(LOCATION));
    }

    #[test]
    fn missing_username_without_prompter_is_no_authenticator() {
        let (services, fixture) = services(false, None);
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");
        let error = location.open_connection(&Monitor::new()).unwrap_err();
        let auth = error.as_authentication().expect("authentication error");
        assert_eq!(auth.failure(), AuthenticationFailure::NoAuthenticator);
        assert_eq!(auth.message(), "username required");
        assert!(attempts(&fixture).is_empty());
    }

    #[test]
    fn missing_username_is_asked_for_before_any_attempt() {
        let prompter = Arc::new(ScriptedPrompter::new(&[("alice", "secret")]));
        let (services, fixture) = services(false, Some(prompter.clone()));
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");
        location.open_connection(&Monitor::new()).expect("connect");
        assert_eq!(prompter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            attempts(&fixture),
            vec![("alice".to_owned(), "secret".to_owned())]
        );
    }

    #[test]
    fn unscramblable_prompted_password_is_asked_for_again() {
        let prompter = Arc::new(ScriptedPrompter::new(&[
            ("alice", "p\u{12c}ss"),
            ("alice", "secret"),
        ]));
        let (services, fixture) = services(false, Some(prompter.clone()));
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");

        location.open_connection(&Monitor::new()).expect("connect");

        assert_eq!(prompter.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            attempts(&fixture),
            vec![("alice".to_owned(), "secret".to_owned())]
        );
        let cached = fixture
            .store
            .get(LOCATION, CREDENTIAL_REALM)
            .unwrap()
            .expect("cached entry");
        assert_eq!(cached.password(), Some("secret"));
    }

    #[test]
    fn transport_failures_skip_the_prompter() {
        let prompter = Arc::new(ScriptedPrompter::new(&[("alice", "secret")]));
        let (services, fixture) = services(true, Some(prompter.clone()));
        fixture
            .store
            .put(
                LOCATION,
                CREDENTIAL_REALM,
                &AuthInfo::new(Some("alice".into()), Some("secret".into())),
            )
            .unwrap();
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");
        let error = location.open_connection(&Monitor::new()).unwrap_err();
        assert!(matches!(error, CvsError::Transport(_)));
        assert_eq!(prompter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_monitor_stops_the_loop() {
        let (services, fixture) = services(false, None);
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");
        let monitor = Monitor::new();
        monitor.cancel();
        assert!(matches!(
            location.open_connection(&monitor),
            Err(CvsError::Cancelled)
        ));
        assert!(attempts(&fixture).is_empty());
    }

    #[test]
    fn validation_records_the_platform() {
        let (services, fixture) = services(false, None);
        fixture
            .store
            .put(
                LOCATION,
                CREDENTIAL_REALM,
                &AuthInfo::new(Some("alice".into()), Some("secret".into())),
            )
            .unwrap();
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");
        location
            .validate_connection(&Monitor::new(), |connection| {
                let banner = connection.read_line()?;
                assert!(banner.contains("(CVS)"));
                Ok(ProbeStatus::ok())
            })
            .expect("validate");
        assert_eq!(location.server_platform(), ServerPlatform::CvsServer);
        assert!(!fixture.store.is_empty());
    }

    #[test]
    fn cvsnt_with_plain_root_is_refused_and_forgotten() {
        let (services, fixture) = services(false, None);
        fixture
            .store
            .put(
                LOCATION,
                CREDENTIAL_REALM,
                &AuthInfo::new(Some("alice".into()), Some("secret".into())),
            )
            .unwrap();
        let mut location = RepositoryLocation::from_text(LOCATION, services).expect("location");
        let error = location
            .validate_connection(&Monitor::new(), |_| {
                Ok(ProbeStatus::new(
                    StatusSeverity::Warning,
                    StatusCode::ServerIsCvsnt,
                    "CVSNT",
                ))
            })
            .unwrap_err();
        let auth = error.as_authentication().expect("authentication error");
        assert_eq!(auth.failure(), AuthenticationFailure::UnsupportedServer);
        assert!(!auth.is_retryable());
        assert_eq!(location.server_platform(), ServerPlatform::CvsntServer);
        assert!(fixture.store.is_empty());
    }
}
