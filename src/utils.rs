//! Date formatting, slugs, and file system checks.
//!
//! - [`EditionDate`] turns a day offset into the Italian display date used in
//!   download URLs, archive keys, and log file names
//! - [`slugify`] builds file-name-safe fragments
//! - [`ensure_writable_dir`] validates output directories before a run

use crate::error::DateError;
use chrono::{Datelike, Days, Local, NaiveDate};
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

const ITALIAN_MONTHS: [&str; 12] = [
    "gennaio",
    "febbraio",
    "marzo",
    "aprile",
    "maggio",
    "giugno",
    "luglio",
    "agosto",
    "settembre",
    "ottobre",
    "novembre",
    "dicembre",
];

/// The calendar day a run targets.
///
/// Offsets are relative to a base day: `0` is the base, `-1` the day before,
/// `+1` the day after. Any `i64` is accepted; the only bound is chrono's
/// `NaiveDate` range (roughly ±262 000 years), past which
/// [`DateError::OutOfRange`] is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditionDate(NaiveDate);

impl EditionDate {
    /// Offset from today's local calendar date.
    pub fn from_today(offset: i64) -> Result<Self, DateError> {
        Self::from_base(Local::now().date_naive(), offset)
    }

    /// Offset from an explicit base day.
    ///
    /// # Arguments
    ///
    /// * `base` - The day that offset `0` refers to
    /// * `offset` - Days to move, negative for the past
    ///
    /// # Errors
    ///
    /// [`DateError::OutOfRange`] when the result falls outside chrono's calendar.
    pub fn from_base(base: NaiveDate, offset: i64) -> Result<Self, DateError> {
        let days = Days::new(offset.unsigned_abs());
        let day = if offset >= 0 {
            base.checked_add_days(days)
        } else {
            base.checked_sub_days(days)
        };
        day.map(Self).ok_or(DateError::OutOfRange(offset))
    }

    /// `<day><sep><month><sep><year>`, e.g. `5-ottobre-2026` for `sep = "-"`.
    ///
    /// The day is not zero-padded and the month name is lowercase Italian.
    pub fn display(&self, separator: &str) -> String {
        let month = ITALIAN_MONTHS[self.0.month0() as usize];
        format!(
            "{}{sep}{}{sep}{:04}",
            self.0.day(),
            month,
            self.0.year(),
            sep = separator
        )
    }

    /// `YYYY-MM-DD`, sorts chronologically as a plain string.
    pub fn sortable_key(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

/// Lowercase, hyphen-separated fragment safe for file names.
///
/// # Arguments
///
/// * `text` - Free text such as the newspaper name
///
/// # Returns
///
/// `text` without punctuation, words joined by `-`.
///
/// ```ignore
/// assert_eq!(slugify("Il Giornale!"), "il-giornale");
/// ```
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    // Plain std write keeps the error surface simple
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Directory is writable");
    Ok(())
}
