use std::io::{self, BufRead, Write};

use cvs_core::repository::{PromptCancelled, Prompter, RepositoryLocation, UserInfo};
use is_terminal::IsTerminal;
use tracing::debug;

/// Asks for credentials on the controlling terminal.
///
/// When standard input is not a terminal the prompt is cancelled instead of
/// blocking, so scripted runs fail with the server's message.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    /// Creates a prompter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Prompter for TerminalPrompter {
    fn prompt(
        &self,
        location: &RepositoryLocation,
        info: &mut UserInfo,
        message: &str,
    ) -> Result<(), PromptCancelled> {
        if !io::stdin().is_terminal() {
            debug!(target: "cvs::auth", "stdin is not a terminal, not prompting");
            return Err(PromptCancelled);
        }

        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{location}: {message}").map_err(|_| PromptCancelled)?;
        if info.is_username_mutable() {
            let asked = if info.username().is_empty() {
                write!(stderr, "Username: ")
            } else {
                write!(stderr, "Username [{}]: ", info.username())
            };
            asked
                .and_then(|()| stderr.flush())
                .map_err(|_| PromptCancelled)?;

            let mut line = String::new();
            let read = io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|_| PromptCancelled)?;
            if read == 0 {
                return Err(PromptCancelled);
            }
            let answer = line.trim();
            if !answer.is_empty() {
                info.set_username(answer);
            }
        }
        if info.username().is_empty() {
            return Err(PromptCancelled);
        }
        drop(stderr);

        let password = rpassword::prompt_password(format!(
            "Password for {}@{}: ",
            info.username(),
            location.host()
        ))
        .map_err(|_| PromptCancelled)?;
        info.set_password(password);
        Ok(())
    }
}
