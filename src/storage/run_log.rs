//! Persist the run log as `<logs_dir>/<day>_<month>_<year>.log`.

use crate::models::RunLog;
use crate::utils::EditionDate;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// File name of the log for `date`, e.g. `19_ottobre_2026.log`.
pub fn log_file_name(date: &EditionDate) -> String {
    format!("{}.log", date.display("_"))
}

/// Write `log` for `date`, replacing an earlier log of the same day.
#[instrument(level = "info", skip_all, fields(logs_dir = %logs_dir.display(), date = %date.sortable_key()))]
pub async fn write(logs_dir: &Path, date: &EditionDate, log: &RunLog) -> std::io::Result<PathBuf> {
    fs::create_dir_all(logs_dir).await?;
    let path = logs_dir.join(log_file_name(date));
    fs::write(&path, log.as_str()).await?;
    info!(path = %path.display(), "Wrote run log");
    Ok(path)
}
