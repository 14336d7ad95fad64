use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command, builder::OsStringValueParser, value_parser};

pub(crate) const PROGRAM_NAME: &str = "cvsconn";

/// Parsed command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ParsedArgs {
    pub(crate) verbose: bool,
    pub(crate) store: Option<PathBuf>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) action: Action,
    pub(crate) location: String,
}

/// Subcommand to run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Action {
    Validate,
    Parse,
    Login,
    Logout,
}

fn location_arg() -> Arg {
    Arg::new("location")
        .value_name("LOCATION")
        .help("Repository location, :method:[user[:password]@]host[#port]:/path")
        .required(true)
        .allow_hyphen_values(true)
}

/// Builds the `clap` command used for parsing.
pub(crate) fn clap_command() -> Command {
    Command::new(PROGRAM_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Check CVS repository locations and manage their cached credentials")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log connection and authentication details to stderr.")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("PATH")
                .help("Credential file (default: $HOME/.cvsconn/credentials.json).")
                .value_parser(OsStringValueParser::new())
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .help("Give up on unresponsive servers after SECS seconds.")
                .value_parser(value_parser!(u64).range(1..))
                .global(true),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a location and print 'ok' or what is wrong with it.")
                .arg(location_arg()),
        )
        .subcommand(
            Command::new("parse")
                .about("Print the fields of a location.")
                .arg(location_arg()),
        )
        .subcommand(
            Command::new("login")
                .about("Authenticate against the server and cache the credentials.")
                .arg(location_arg()),
        )
        .subcommand(
            Command::new("logout")
                .about("Forget the cached credentials of a location.")
                .arg(location_arg()),
        )
}

/// Parses `arguments`, the first of which is the program name.
pub(crate) fn parse_args<I, S>(arguments: I) -> Result<ParsedArgs, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
{
    let matches = clap_command().try_get_matches_from(arguments)?;
    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| clap_command().error(clap::error::ErrorKind::MissingSubcommand, "a subcommand is required"))?;
    let action = match name {
        "validate" => Action::Validate,
        "parse" => Action::Parse,
        "login" => Action::Login,
        _ => Action::Logout,
    };
    Ok(ParsedArgs {
        verbose: flag(&matches, sub, "verbose"),
        store: sub
            .get_one::<OsString>("store")
            .or_else(|| matches.get_one::<OsString>("store"))
            .map(PathBuf::from),
        timeout: sub
            .get_one::<u64>("timeout")
            .or_else(|| matches.get_one::<u64>("timeout"))
            .map(|secs| Duration::from_secs(*secs)),
        action,
        location: sub
            .get_one::<String>("location")
            .cloned()
            .unwrap_or_default(),
    })
}

fn flag(matches: &ArgMatches, sub: &ArgMatches, name: &str) -> bool {
    sub.get_flag(name) || matches.get_flag(name)
}
