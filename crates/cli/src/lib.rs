#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` is the command-line front-end of the `cvsconn` binary. It checks
//! repository location strings, logs in to CVS servers through the
//! authentication retry loop of [`cvs_core`] and manages the credential file
//! those logins populate.
//!
//! # Design
//!
//! [`run`] takes the argument iterator together with handles for standard
//! output and error and returns the exit status, so tests drive it with
//! in-memory buffers. Diagnostics go to the error handle; tracing output,
//! enabled with `-v` or `CVSCONN_LOG`, goes to the process's stderr.
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 0 | success |
//! | 1 | usage or location error |
//! | 2 | authentication failure or cancelled prompt |
//! | 3 | transport or communication failure |
//! | 4 | credential store failure |
//!
//! # Examples
//!
//! ```
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let status = cli::run(
//!     ["cvsconn", "validate", ":pserver:anonymous@cvs.example.org:/cvsroot"],
//!     &mut stdout,
//!     &mut stderr,
//! );
//!
//! assert_eq!(status, 0);
//! assert_eq!(stdout, b"ok\n");
//! ```

mod command;
mod prompter;

use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use cvs_core::location::{LocationAddress, parse_location, validate_location};
use cvs_core::repository::{FileCredentialStore, LocationServices, RepositoryLocation};
use cvs_core::transport::{ConnectOptions, ExtSettings, MethodRegistry, Monitor, ProxyConfig};
use cvs_core::CvsError;
use tracing_subscriber::EnvFilter;

use command::{Action, PROGRAM_NAME, ParsedArgs, parse_args};
pub use prompter::TerminalPrompter;

/// Environment variable holding the tracing filter directives.
pub const LOG_ENV: &str = "CVSCONN_LOG";

/// Success.
pub const EXIT_OK: i32 = 0;
/// Invalid arguments or location.
pub const EXIT_USAGE: i32 = 1;
/// Credentials were rejected or the prompt was cancelled.
pub const EXIT_AUTHENTICATION: i32 = 2;
/// The server could not be reached or the connection failed.
pub const EXIT_TRANSPORT: i32 = 3;
/// The credential file could not be read or written.
pub const EXIT_CREDENTIAL_STORE: i32 = 4;

const MAX_EXIT_CODE: i32 = 255;

/// Runs the CLI using the provided argument iterator and output handles.
///
/// Returns the process exit status.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    match parse_args(arguments) {
        Ok(parsed) => {
            init_tracing(parsed.verbose);
            execute(&parsed, stdout, stderr)
        }
        Err(error) if !error.use_stderr() => {
            if write!(stdout, "{error}").is_err() {
                return EXIT_USAGE;
            }
            EXIT_OK
        }
        Err(error) => {
            let _ = write!(stderr, "{error}");
            EXIT_USAGE
        }
    }
}

/// Converts a numeric exit code into an [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    let clamped = status.clamp(0, MAX_EXIT_CODE);
    std::process::ExitCode::from(clamped as u8)
}

/// Maps an error to the exit status reported for it.
#[must_use]
pub const fn exit_status(error: &CvsError) -> i32 {
    match error {
        CvsError::Location(_) | CvsError::FixedCredential { .. } => EXIT_USAGE,
        CvsError::Authentication(_) => EXIT_AUTHENTICATION,
        CvsError::Transport(_) | CvsError::Communication(_) | CvsError::Cancelled => EXIT_TRANSPORT,
        CvsError::CredentialStore(_) => EXIT_CREDENTIAL_STORE,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn execute<Out, Err>(parsed: &ParsedArgs, stdout: &mut Out, stderr: &mut Err) -> i32
where
    Out: Write,
    Err: Write,
{
    let outcome = match parsed.action {
        Action::Validate => validate(&parsed.location, stdout),
        Action::Parse => parse(&parsed.location, stdout),
        Action::Login => login(parsed, stdout),
        Action::Logout => logout(parsed, stdout),
    };
    match outcome {
        Ok(()) => EXIT_OK,
        Err(Failure::Cvs(error)) => {
            let cancelled = error
                .as_authentication()
                .is_some_and(|auth| auth.is_cancelled());
            if !cancelled {
                let _ = writeln!(stderr, "{PROGRAM_NAME}: {error}");
            }
            exit_status(&error)
        }
        Err(Failure::Output) => EXIT_USAGE,
        Err(Failure::NoStorePath) => {
            let _ = writeln!(
                stderr,
                "{PROGRAM_NAME}: cannot locate the credential file; set HOME or pass --store"
            );
            EXIT_CREDENTIAL_STORE
        }
    }
}

enum Failure {
    Cvs(CvsError),
    Output,
    NoStorePath,
}

impl From<CvsError> for Failure {
    fn from(error: CvsError) -> Self {
        Self::Cvs(error)
    }
}

impl From<std::io::Error> for Failure {
    fn from(_: std::io::Error) -> Self {
        Self::Output
    }
}

fn validate<Out: Write>(text: &str, stdout: &mut Out) -> Result<(), Failure> {
    validate_location(text, &MethodRegistry::default()).map_err(CvsError::from)?;
    writeln!(stdout, "ok")?;
    Ok(())
}

fn parse<Out: Write>(text: &str, stdout: &mut Out) -> Result<(), Failure> {
    let address = parse_location(text, &MethodRegistry::default()).map_err(CvsError::from)?;
    write_fields(&address, stdout)?;
    Ok(())
}

fn write_fields<Out: Write>(address: &LocationAddress, stdout: &mut Out) -> std::io::Result<()> {
    let password = match (address.password(), address.is_password_fixed()) {
        (None, _) => "(none)",
        (Some(_), true) => "*** (fixed)",
        (Some(_), false) => "***",
    };
    let port = address
        .port()
        .explicit()
        .map_or_else(|| String::from("(default)"), |port| port.to_string());
    writeln!(stdout, "method:   {}", address.method())?;
    writeln!(stdout, "user:     {}", address.user().unwrap_or("(none)"))?;
    writeln!(stdout, "password: {password}")?;
    writeln!(stdout, "host:     {}", address.host())?;
    writeln!(stdout, "port:     {port}")?;
    writeln!(stdout, "root:     {}", address.root())?;
    writeln!(stdout, "location: {address}")
}

fn store_path(parsed: &ParsedArgs) -> Result<PathBuf, Failure> {
    if let Some(path) = &parsed.store {
        return Ok(path.clone());
    }
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".cvsconn").join("credentials.json"))
        .ok_or(Failure::NoStorePath)
}

fn services(parsed: &ParsedArgs) -> Result<LocationServices, Failure> {
    let mut options = ConnectOptions::builder()
        .proxy(ProxyConfig::from_env()?)
        .ext(ExtSettings::from_env());
    if let Some(timeout) = parsed.timeout {
        options = options.timeout(timeout);
    }
    Ok(LocationServices::default()
        .with_options(options.build())
        .with_credential_store(Arc::new(FileCredentialStore::new(store_path(parsed)?)))
        .with_prompter(Arc::new(TerminalPrompter::new())))
}

fn login<Out: Write>(parsed: &ParsedArgs, stdout: &mut Out) -> Result<(), Failure> {
    let mut location = RepositoryLocation::from_text(&parsed.location, services(parsed)?)?;
    let mut monitor = Monitor::new();
    if let Some(timeout) = parsed.timeout {
        monitor = monitor.with_timeout(timeout);
    }
    let mut connection = location.open_connection(&monitor)?;
    connection.close().map_err(CvsError::from)?;
    location.update_cache()?;
    writeln!(stdout, "logged in to {location}")?;
    Ok(())
}

fn logout<Out: Write>(parsed: &ParsedArgs, stdout: &mut Out) -> Result<(), Failure> {
    let location = RepositoryLocation::from_text(&parsed.location, services(parsed)?)?;
    location.dispose()?;
    writeln!(stdout, "forgot credentials for {location}")?;
    Ok(())
}
