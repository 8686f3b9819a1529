//! Public file hosting for downloaded editions.
//!
//! # Architecture
//!
//! - [`FileHost`]: uploads a file and returns its public link
//! - [`TfLinkHost`]: multipart upload to a tmpfile.link-compatible API
//! - [`upload_and_archive`]: upload, wait for the host to settle, archive
//!   the link, then delete the local copy
//!
//! The local file is removed only after the link is safely in the archive,
//! so a failed archive write never loses the edition.

use crate::error::{RetrievalError, UploadError};
use crate::models::{ArchiveEntry, RunLog};
use crate::storage::archive;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// Something that turns a local file into a public link.
pub trait FileHost {
    async fn upload(&self, path: &Path, display_name: &str) -> Result<String, UploadError>;
}

/// Upload client for tmpfile.link.
///
/// Sends the file as the `file` field of a multipart POST and reads
/// `downloadLink` from the JSON reply.
#[derive(Debug, Clone)]
pub struct TfLinkHost {
    client: Client,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    download_link: Option<String>,
    file_name: Option<String>,
}

/// Content type sent for the uploaded file, chosen by extension.
fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("epub") => "application/epub+zip",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

impl TfLinkHost {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            upload_url: upload_url.into(),
        }
    }
}

impl FileHost for TfLinkHost {
    #[instrument(level = "info", skip_all, fields(path = %path.display(), %display_name))]
    async fn upload(&self, path: &Path, display_name: &str) -> Result<String, UploadError> {
        let t0 = Instant::now();
        let bytes = fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(display_name.to_string())
            .mime_str(mime_for(path))?;
        let form = Form::new().part("file", part);

        let response: UploadResponse = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let link = response
            .download_link
            .filter(|link| !link.is_empty())
            .ok_or(UploadError::MissingLink)?;
        info!(
            bytes = size,
            elapsed_ms = t0.elapsed().as_millis(),
            stored_as = response.file_name.as_deref().unwrap_or(display_name),
            "Upload complete"
        );
        Ok(link)
    }
}

/// Upload `path`, archive the link under `date`, and delete the file.
///
/// `settle` is slept between the upload and the archive write; the host may
/// hand out a link before the file behind it is ready.
///
/// # Arguments
///
/// * `display_name` - File name the host stores the upload under
/// * `date` - Archive key, the space-separated display date
///
/// # Errors
///
/// [`RetrievalError::Upload`] or [`RetrievalError::Archive`]. In both cases
/// the local file is kept.
#[instrument(level = "info", skip_all, fields(path = %path.display(), %date))]
pub async fn upload_and_archive<H: FileHost>(
    host: &H,
    path: &Path,
    display_name: &str,
    archive_path: &Path,
    date: &str,
    settle: Duration,
    log: &mut RunLog,
) -> Result<String, RetrievalError> {
    let link = host.upload(path, display_name).await?;
    log.note(format!("Uploaded as {display_name}."));
    sleep(settle).await;

    let evicted = archive::prepend(archive_path, ArchiveEntry::new(date, link.clone())).await?;
    if let Some(old) = evicted {
        log.note(format!(
            "The archive includes more than seven editions. {} has been removed.",
            old.date
        ));
    }
    log.note("Pdf appended to the archive.");

    match fs::remove_file(path).await {
        Ok(()) => log.note("Pdf uploaded and deleted from folder."),
        Err(e) => {
            warn!(error = %e, "Could not delete uploaded file");
            log.failure(format!("Could not delete {}: {e}", path.display()));
        }
    }
    Ok(link)
}
