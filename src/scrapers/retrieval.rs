//! Retrieval of one dated edition.
//!
//! # State Machine
//!
//! ```text
//! Init ──login──▶ LoggedIn ──navigate──▶ Downloading ──file appears──▶ Downloaded ──upload──▶ Done
//!   │                │                        │                            │
//!   └────────────────┴────────────────────────┴────────────────────────────┴──▶ Failed
//! ```
//!
//! The browser session opens on entry and is closed before the upload,
//! whichever way the browser part ends. Every failure is written to the run
//! log and ends the run with [`RunOutcome::Failure`]; nothing is retried.
//!
//! The settle delays around navigation are fixed waits taken from
//! [`TimingsConfig`](crate::config::TimingsConfig). They paper over slow
//! connections and are the usual suspect when a run fails intermittently.

use crate::config::Settings;
use crate::error::{BrowserError, RetrievalError};
use crate::hosting::{upload_and_archive, FileHost};
use crate::models::{RunLog, RunOutcome, Stage};
use crate::scrapers::browser::{BrowserLauncher, BrowserSession, Locator};
use crate::utils::{slugify, EditionDate};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument};

/// Newspaper account used to log in.
#[derive(Clone, Copy)]
pub struct LoginSecrets<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Run the state machine for `date` and fold the result into a [`RunOutcome`].
#[instrument(level = "info", skip_all, fields(date = %date.sortable_key()))]
pub async fn scrape<L, H>(
    settings: &Settings,
    date: &EditionDate,
    secrets: LoginSecrets<'_>,
    launcher: &L,
    host: &H,
    log: &mut RunLog,
) -> RunOutcome
where
    L: BrowserLauncher,
    H: FileHost,
{
    match retrieve(settings, date, secrets, launcher, host, log).await {
        Ok(link) => {
            debug!(stage = %Stage::Done, "Retrieval finished");
            RunOutcome::Success { link }
        }
        Err(error) => {
            log.failure(format!("Failed at stage {}: {error}", error.stage()));
            RunOutcome::Failure { error }
        }
    }
}

/// `Init` to `Done`: returns the public link of the archived edition.
pub async fn retrieve<L, H>(
    settings: &Settings,
    date: &EditionDate,
    secrets: LoginSecrets<'_>,
    launcher: &L,
    host: &H,
    log: &mut RunLog,
) -> Result<String, RetrievalError>
where
    L: BrowserLauncher,
    H: FileHost,
{
    let url_date = date.display("-");
    let download_url = settings.download_url(&url_date);
    log.note(format!("Download link:\n{download_url}"));

    let mut session = launcher.launch().await.map_err(RetrievalError::Login)?;
    log.note("Browser started.");

    let downloaded = drive_browser(&mut session, settings, secrets, &download_url, log).await;
    match session.close().await {
        Ok(()) => debug!("Browser closed"),
        Err(e) => log.failure(format!("Browser did not close cleanly: {e}")),
    }
    let pdf = downloaded?;
    debug!(stage = %Stage::Downloaded, path = %pdf.display());

    let display_name = format!(
        "il-{}-del-{}.{}",
        slugify(&settings.newspaper_name),
        url_date,
        settings.download_extension
    );
    upload_and_archive(
        host,
        &pdf,
        &display_name,
        &settings.archive_path,
        &date.display(" "),
        settings.timings.upload_settle(),
        log,
    )
    .await
}

/// The part of the run that needs the browser: login, navigate, wait.
async fn drive_browser<S: BrowserSession>(
    session: &mut S,
    settings: &Settings,
    secrets: LoginSecrets<'_>,
    download_url: &str,
    log: &mut RunLog,
) -> Result<PathBuf, RetrievalError> {
    login(session, settings, secrets, log).await?;
    debug!(stage = %Stage::LoggedIn);

    let timings = &settings.timings;
    let dir = &settings.download_dir;
    let ext = &settings.download_extension;
    let before = matching_files(dir, ext).await?;

    sleep(timings.pre_navigation_settle()).await;
    session
        .navigate(download_url)
        .await
        .map_err(RetrievalError::Navigation)?;
    sleep(timings.post_navigation_settle()).await;
    debug!(stage = %Stage::Downloading);

    let pdf = wait_for_download(
        dir,
        ext,
        &before,
        timings.download_timeout(),
        timings.download_poll(),
    )
    .await?;
    log.note(format!("Downloaded {}.", pdf.display()));
    Ok(pdf)
}

#[instrument(level = "info", skip_all)]
async fn login<S: BrowserSession>(
    session: &mut S,
    settings: &Settings,
    secrets: LoginSecrets<'_>,
    log: &mut RunLog,
) -> Result<(), RetrievalError> {
    let selectors = &settings.selectors;
    let wait = settings.timings.login_wait();

    session
        .navigate(&settings.login_url)
        .await
        .map_err(RetrievalError::Login)?;
    dismiss_cookie_banner(session, settings, log).await;

    session
        .fill(&Locator::Name(selectors.email_field.clone()), secrets.email, wait)
        .await
        .map_err(RetrievalError::Login)?;
    session
        .fill(
            &Locator::Name(selectors.password_field.clone()),
            secrets.password,
            wait,
        )
        .await
        .map_err(RetrievalError::Login)?;
    session
        .click(&Locator::XPath(selectors.submit_button.clone()), wait)
        .await
        .map_err(RetrievalError::Login)?;

    log.note("Logged in.");
    Ok(())
}

/// The banner only shows up on some visits; not finding it is fine.
async fn dismiss_cookie_banner<S: BrowserSession>(session: &mut S, settings: &Settings, log: &mut RunLog) {
    let banner = Locator::XPath(settings.selectors.cookie_banner.clone());
    match session.click(&banner, settings.timings.banner_wait()).await {
        Ok(()) => log.note("Cookie banner dismissed."),
        Err(BrowserError::ElementNotFound { .. }) => log.note("No cookie banner found."),
        Err(e) => log.note(format!("Cookie banner not dismissed: {e}")),
    }
}

/// Names of files in `dir` ending in `.<extension>`.
///
/// Chrome writes partial downloads as `<name>.crdownload`, which never match.
async fn matching_files(dir: &Path, extension: &str) -> Result<HashSet<OsString>, RetrievalError> {
    let scan_err = |source| RetrievalError::DownloadScan {
        dir: dir.to_path_buf(),
        source,
    };
    let mut found = HashSet::new();
    let mut entries = fs::read_dir(dir).await.map_err(scan_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(scan_err)? {
        let path = entry.path();
        let is_match = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if is_match && entry.file_type().await.map_err(scan_err)?.is_file() {
            found.insert(entry.file_name());
        }
    }
    Ok(found)
}

/// Poll `dir` every `poll` until a new `.<extension>` file appears.
///
/// Files listed in `already_present` are ignored, so a leftover from an
/// earlier failed run is not mistaken for today's edition.
#[instrument(level = "info", skip_all, fields(dir = %dir.display(), %extension))]
pub async fn wait_for_download(
    dir: &Path,
    extension: &str,
    already_present: &HashSet<OsString>,
    timeout: Duration,
    poll: Duration,
) -> Result<PathBuf, RetrievalError> {
    let deadline = Instant::now() + timeout;
    loop {
        let current = matching_files(dir, extension).await?;
        if let Some(name) = current.iter().find(|name| !already_present.contains(*name)) {
            let path = dir.join(name);
            info!(path = %path.display(), "Download finished");
            return Ok(path);
        }
        if Instant::now() >= deadline {
            return Err(RetrievalError::DownloadTimeout {
                dir: dir.to_path_buf(),
                extension: extension.to_string(),
                waited: timeout,
            });
        }
        sleep(poll).await;
    }
}
