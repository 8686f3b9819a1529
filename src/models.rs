//! Data models shared across the run.
//!
//! - [`ArchiveEntry`]: one archived edition, stored on disk as `{"<date>": "<link>"}`
//! - [`AddressBook`]: the sender identity plus the subscriber list
//! - [`RunLog`]: the plain-text log built up during a run and mailed on failure
//! - [`RunOutcome`] / [`Stage`]: where the retrieval state machine ended up

use crate::error::RetrievalError;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// One archived edition.
///
/// The JSON form is a single-key object mapping the display date to the
/// public link, e.g. `{"19 ottobre 2026": "https://tmpfile.link/..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ArchiveEntry {
    /// Display date, words separated by spaces.
    pub date: String,
    /// Public download link returned by the file host.
    pub link: String,
}

impl ArchiveEntry {
    pub fn new(date: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            link: link.into(),
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for ArchiveEntry {
    type Error = String;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(format!(
                "archive entry must have exactly one date key, found {}",
                map.len()
            ));
        }
        let (date, link) = map.into_iter().next().ok_or("empty archive entry")?;
        Ok(Self { date, link })
    }
}

impl From<ArchiveEntry> for BTreeMap<String, String> {
    fn from(entry: ArchiveEntry) -> Self {
        BTreeMap::from([(entry.date, entry.link)])
    }
}

/// Sender identity and subscriber list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    /// Address the mails are sent from, and the only recipient of error reports.
    pub sender: String,
    /// Digest recipients, in insertion order. Duplicates are allowed.
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl AddressBook {
    pub fn add_recipient(&mut self, recipient: impl Into<String>) {
        self.recipients.push(recipient.into());
    }

    /// Remove the first occurrence of `recipient`. Returns `false` when absent.
    pub fn remove_recipient(&mut self, recipient: &str) -> bool {
        match self.recipients.iter().position(|r| r == recipient) {
            Some(idx) => {
                self.recipients.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Numbered listing, one recipient per line starting at 1.
    pub fn numbered(&self) -> String {
        self.recipients
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}\n", i + 1, r))
            .collect()
    }
}

/// States of the retrieval state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    LoggedIn,
    Downloading,
    Downloaded,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::LoggedIn => "logged-in",
            Stage::Downloading => "downloading",
            Stage::Downloaded => "downloaded",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// How the scrape step ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The edition was uploaded and archived under `link`.
    Success { link: String },
    /// The state machine stopped; the reason is also in the run log.
    Failure { error: RetrievalError },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}

/// Plain-text log accumulated over one run.
///
/// Each stage receives the log by `&mut` and appends to it; every line is
/// mirrored to `tracing` so the operator sees the same story on stderr.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    text: String,
}

impl RunLog {
    /// Start a log with the `***<timestamp>***` header line.
    pub fn start() -> Self {
        Self {
            text: format!("***{}***", Local::now().format("%Y-%m-%d %H:%M:%S%.6f")),
        }
    }

    /// Append an informational line.
    pub fn note(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        info!(target: "run_log", "{line}");
        self.push(line);
    }

    /// Append a failure line.
    pub fn failure(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        warn!(target: "run_log", "{line}");
        self.push(line);
    }

    fn push(&mut self, line: &str) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
