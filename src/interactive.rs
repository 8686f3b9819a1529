//! Interactive maintenance shell.
//!
//! The menu and the prompts go through `dialoguer`; what each entry does is
//! in [`dispatch`], which takes an already-read [`Command`] and writes its
//! reply to any [`Write`]. A test run is delegated to the caller-supplied
//! `run` closure.

use crate::config::Settings;
use crate::error::AppError;
use crate::pipeline::RunReport;
use crate::storage::address_book;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use std::io::{self, Write};
use tracing::{info, warn};

const BANNER: &str = "Welcome to the NewsScraper command line interface.";

const MENU: [&str; 5] = [
    "t: test run",
    "p: print mailing list",
    "a: add recipient to mailing list",
    "r: remove recipient from mailing list",
    "q: exit",
];

/// One menu entry with its input already collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the edition this many days from today.
    TestRun(i64),
    Print,
    Add(String),
    Remove(String),
    Quit,
}

/// Show the menu and prompt for whatever the chosen entry needs.
///
/// Escape on the menu quits. A day offset that does not parse is rejected
/// and asked again by the prompt itself.
fn read_command(theme: &ColorfulTheme) -> dialoguer::Result<Command> {
    let Some(choice) = Select::with_theme(theme)
        .with_prompt("What would you like to do?")
        .items(&MENU[..])
        .default(0)
        .interact_opt()?
    else {
        return Ok(Command::Quit);
    };

    let command = match choice {
        0 => Command::TestRun(
            Input::<i64>::with_theme(theme)
                .with_prompt("What day for a test run? (-1 = yesterday, -2 = two days ago...)")
                .default(0)
                .interact_text()?,
        ),
        1 => Command::Print,
        2 => Command::Add(
            Input::<String>::with_theme(theme)
                .with_prompt("Recipient to add")
                .interact_text()?,
        ),
        3 => Command::Remove(
            Input::<String>::with_theme(theme)
                .with_prompt("Recipient to remove")
                .interact_text()?,
        ),
        _ => Command::Quit,
    };
    Ok(command)
}

/// Carry out `command`, reporting on `output`.
///
/// # Returns
///
/// `false` once the shell should stop.
///
/// # Errors
///
/// Only write errors on `output`. Address book and run failures are
/// reported and the shell keeps going.
pub async fn dispatch<O, F>(
    settings: &Settings,
    command: Command,
    output: &mut O,
    run: &mut F,
) -> io::Result<bool>
where
    O: Write,
    F: AsyncFnMut(i64) -> Result<RunReport, AppError>,
{
    let book_path = settings.address_book_path.as_path();
    match command {
        Command::Quit => return Ok(false),
        Command::TestRun(offset) => {
            info!(offset, "Interactive run requested");
            match (*run)(offset).await {
                Ok(report) => {
                    let verdict = if report.outcome.is_success() { "succeeded" } else { "failed" };
                    writeln!(output, "Run {verdict}.")?;
                    if let Some(path) = report.log_path {
                        writeln!(output, "Log written to {}", path.display())?;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Interactive run aborted");
                    writeln!(output, "Run aborted: {e}")?;
                }
            }
        }
        Command::Print => match address_book::load(book_path).await {
            Ok(book) => write!(output, "{}", book.numbered())?,
            Err(e) => writeln!(output, "{e}")?,
        },
        Command::Add(recipient) => match address_book::add_recipient(book_path, &recipient).await {
            Ok(_) => writeln!(output, "{recipient} added.")?,
            Err(e) => writeln!(output, "{e}")?,
        },
        Command::Remove(recipient) => {
            match address_book::remove_recipient(book_path, &recipient).await {
                Ok(true) => writeln!(output, "{recipient} removed.")?,
                Ok(false) => writeln!(output, "{recipient} is not in the address book.")?,
                Err(e) => writeln!(output, "{e}")?,
            }
        }
    }
    Ok(true)
}

/// Run the menu on the terminal until `q` or Escape.
///
/// # Errors
///
/// Terminal I/O failures, including stdin not being a terminal.
pub async fn run_loop<F>(settings: &Settings, mut run: F) -> io::Result<()>
where
    F: AsyncFnMut(i64) -> Result<RunReport, AppError>,
{
    let theme = ColorfulTheme::default();
    let mut output = io::stdout();
    writeln!(output, "{BANNER}")?;
    loop {
        let command = read_command(&theme).map_err(io::Error::other)?;
        if !dispatch(settings, command, &mut output, &mut run).await? {
            break;
        }
    }
    writeln!(output, "Exiting")?;
    Ok(())
}
