//! One end-to-end run: retrieve, archive, notify.
//!
//! [`execute_run`] does the fallible setup (directories, lock, credentials,
//! address book) and wires the production services; [`run_edition`] runs the
//! edition against whatever services it is handed and never fails. A run
//! always ends with an attempt to notify: the digest on success, the error
//! report with the run log attached otherwise.

use crate::config::Settings;
use crate::credentials::{self, Credentials};
use crate::error::AppError;
use crate::hosting::{FileHost, TfLinkHost};
use crate::mailer::smtp::SmtpRelay;
use crate::mailer::{compose_digest, compose_error_report, MailRelay, Mode, Notifier};
use crate::models::{AddressBook, RunLog, RunOutcome};
use crate::scrapers::browser::{BrowserLauncher, ChromeLauncher};
use crate::scrapers::retrieval::{scrape, LoginSecrets};
use crate::storage::lock::RunLock;
use crate::storage::{address_book, run_log};
use crate::utils::{ensure_writable_dir, EditionDate};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// What a run did.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Which mail was attempted.
    pub mode: Mode,
    /// Whether the relay accepted it.
    pub notified: bool,
    /// Where the run log was written, if writing it worked.
    pub log_path: Option<PathBuf>,
}

async fn writable(path: &Path) -> Result<(), AppError> {
    ensure_writable_dir(path)
        .await
        .map_err(|source| AppError::Directory {
            path: path.to_path_buf(),
            source,
        })
}

/// Run the edition `offset` days from today with the production services.
///
/// Errors are the fatal set only: unusable directories, a run already in
/// progress, unreadable credentials, or a missing address book.
#[instrument(level = "info", skip_all, fields(offset = offset))]
pub async fn execute_run(settings: &Settings, offset: i64) -> Result<RunReport, AppError> {
    let date = EditionDate::from_today(offset)?;
    writable(&settings.logs_dir).await?;
    writable(&settings.download_dir).await?;
    let _lock = RunLock::acquire(&settings.lock_path)?;

    let credentials = Credentials::decrypt(&settings.credentials_path, &settings.key_path).await?;
    let book = address_book::load(&settings.address_book_path).await?;
    let secrets = LoginSecrets {
        email: credentials.get(credentials::EMAIL)?,
        password: credentials.get(credentials::PASSWORD)?,
    };

    let launcher = ChromeLauncher::new(settings.browser.clone(), &settings.download_dir);
    let host = TfLinkHost::new(settings.hosting.upload_url.clone());
    let notifier = Notifier::new(SmtpRelay::new(
        settings.smtp.clone(),
        book.sender.clone(),
        credentials.get(credentials::RELAY_TOKEN)?,
    ));

    Ok(run_edition(settings, &date, &book, secrets, &launcher, &host, &notifier).await)
}

/// Retrieve `date`, notify, and persist the run log.
#[instrument(level = "info", skip_all, fields(date = %date.sortable_key()))]
pub async fn run_edition<L, H, R>(
    settings: &Settings,
    date: &EditionDate,
    book: &AddressBook,
    secrets: LoginSecrets<'_>,
    launcher: &L,
    host: &H,
    notifier: &Notifier<R>,
) -> RunReport
where
    L: BrowserLauncher,
    H: FileHost,
    R: MailRelay,
{
    let mut log = RunLog::start();
    let outcome = scrape(settings, date, secrets, launcher, host, &mut log).await;

    let mut mode = Mode::ErrorReport;
    let mut notified = false;
    if let RunOutcome::Success { ref link } = outcome {
        log.note(format!("Edition available at {link}"));
        match compose_digest(settings, book, &settings.archive_path).await {
            Ok(email) => {
                mode = Mode::Digest;
                notified = notifier.deliver(&email, &mut log).await;
                if notified {
                    log.note("All done!");
                }
            }
            Err(e) => log.failure(format!("Digest not sent: {e}")),
        }
    }

    if mode == Mode::ErrorReport {
        let email = compose_error_report(settings, book, &log, &run_log::log_file_name(date));
        notified = notifier.deliver(&email, &mut log).await;
    }

    let log_path = match run_log::write(&settings.logs_dir, date, &log).await {
        Ok(path) => Some(path),
        Err(e) => {
            error!(error = %e, "Failed to write run log");
            None
        }
    };
    info!(success = outcome.is_success(), ?mode, notified, "Run finished");

    RunReport {
        outcome,
        mode,
        notified,
        log_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingsConfig;
    use crate::error::{BrowserError, NotificationError, RetrievalError, UploadError};
    use crate::mailer::OutgoingEmail;
    use crate::models::{ArchiveEntry, Stage};
    use crate::scrapers::browser::{BrowserSession, Locator};
    use crate::storage::archive;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::fs;

    const DOWNLOAD_URL: &str = "https://news.example/pdf/19-ottobre-2026";

    #[derive(Clone)]
    enum Behaviour {
        FailLaunch,
        FailLogin,
        FailNavigation,
        DownloadTo(PathBuf),
    }

    struct FakeLauncher {
        behaviour: Behaviour,
        banner_present: bool,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl FakeLauncher {
        fn new(behaviour: Behaviour, calls: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                behaviour,
                banner_present: false,
                calls: Rc::clone(calls),
            }
        }
    }

    struct FakeSession {
        behaviour: Behaviour,
        banner_present: bool,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl BrowserLauncher for FakeLauncher {
        type Session = FakeSession;

        async fn launch(&self) -> Result<FakeSession, BrowserError> {
            self.calls.borrow_mut().push("launch".to_string());
            if let Behaviour::FailLaunch = self.behaviour {
                return Err(BrowserError::Launch("chrome executable not found".to_string()));
            }
            Ok(FakeSession {
                behaviour: self.behaviour.clone(),
                banner_present: self.banner_present,
                calls: Rc::clone(&self.calls),
            })
        }
    }

    impl BrowserSession for FakeSession {
        async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
            self.calls.borrow_mut().push(format!("navigate {url}"));
            if url != DOWNLOAD_URL {
                return Ok(());
            }
            match &self.behaviour {
                Behaviour::FailNavigation => Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_RESET".to_string(),
                }),
                Behaviour::DownloadTo(dir) => {
                    fs::write(dir.join("edition.pdf"), b"%PDF-1.7").await.unwrap();
                    Ok(())
                }
                Behaviour::FailLaunch | Behaviour::FailLogin => Ok(()),
            }
        }

        async fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
            self.calls.borrow_mut().push(format!("click {locator}"));
            if locator.to_string().contains("Ho capito") && !self.banner_present {
                return Err(BrowserError::ElementNotFound {
                    locator: locator.to_string(),
                    waited: timeout,
                });
            }
            Ok(())
        }

        async fn fill(&mut self, locator: &Locator, _text: &str, timeout: Duration) -> Result<(), BrowserError> {
            self.calls.borrow_mut().push(format!("fill {locator}"));
            if let Behaviour::FailLogin = self.behaviour {
                return Err(BrowserError::ElementNotFound {
                    locator: locator.to_string(),
                    waited: timeout,
                });
            }
            Ok(())
        }

        async fn close(self) -> Result<(), BrowserError> {
            self.calls.borrow_mut().push("close".to_string());
            Ok(())
        }
    }

    struct FakeHost;

    impl FileHost for FakeHost {
        async fn upload(&self, path: &Path, display_name: &str) -> Result<String, UploadError> {
            assert!(path.exists());
            Ok(format!("https://host/{display_name}"))
        }
    }

    #[derive(Default)]
    struct RecordingRelay {
        sent: RefCell<Vec<OutgoingEmail>>,
    }

    impl MailRelay for RecordingRelay {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), NotificationError> {
            self.sent.borrow_mut().push(email.clone());
            Ok(())
        }
    }

    fn settings(root: &Path) -> Settings {
        Settings {
            download_url_template: "https://news.example/pdf/{date}".to_string(),
            download_dir: root.join("downloads"),
            archive_path: root.join("archive.json"),
            logs_dir: root.join("logs"),
            timings: TimingsConfig {
                login_wait: 0.0,
                banner_wait: 0.0,
                pre_navigation_settle: 0.0,
                post_navigation_settle: 0.0,
                download_timeout: 1.0,
                download_poll: 0.01,
                upload_settle: 0.0,
            },
            ..Settings::default()
        }
    }

    fn book() -> AddressBook {
        AddressBook {
            sender: "me@example.com".to_string(),
            recipients: vec!["a@x.it".to_string(), "b@x.it".to_string()],
        }
    }

    fn date() -> EditionDate {
        EditionDate::from_base(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(), 0).unwrap()
    }

    const SECRETS: LoginSecrets<'static> = LoginSecrets {
        email: "reader@example.com",
        password: "hunter2",
    };

    #[tokio::test]
    async fn test_navigation_failure_sends_error_report_to_sender() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::create_dir_all(&settings.download_dir).await.unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let launcher = FakeLauncher::new(Behaviour::FailNavigation, &calls);
        let notifier = Notifier::new(RecordingRelay::default());

        let report =
            run_edition(&settings, &date(), &book(), SECRETS, &launcher, &FakeHost, &notifier).await;

        match &report.outcome {
            RunOutcome::Failure { error } => {
                assert!(matches!(error, RetrievalError::Navigation(_)));
                assert_eq!(error.stage(), Stage::LoggedIn);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(report.mode, Mode::ErrorReport);
        assert!(report.notified);
        assert_eq!(calls.borrow().last().map(String::as_str), Some("close"));

        let sent = notifier.relay().sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["me@example.com"]);
        let attachment = sent[0].attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "19_ottobre_2026.log");
        assert!(attachment.content.contains("Logged in."));
        assert!(attachment.content.contains("ERR_CONNECTION_RESET"));

        assert!(!settings.archive_path.exists());
        let log_path = report.log_path.unwrap();
        assert!(log_path.ends_with("logs/19_ottobre_2026.log"));
        assert!(fs::read_to_string(&log_path).await.unwrap().contains("Email sent."));
    }

    #[tokio::test]
    async fn test_login_failure_closes_browser_and_reports_init_stage() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::create_dir_all(&settings.download_dir).await.unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let launcher = FakeLauncher::new(Behaviour::FailLogin, &calls);
        let notifier = Notifier::new(RecordingRelay::default());

        let report =
            run_edition(&settings, &date(), &book(), SECRETS, &launcher, &FakeHost, &notifier).await;

        match &report.outcome {
            RunOutcome::Failure { error } => {
                assert!(matches!(
                    error,
                    RetrievalError::Login(BrowserError::ElementNotFound { .. })
                ));
                assert_eq!(error.stage(), Stage::Init);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let calls = calls.borrow();
        assert_eq!(calls.last().map(String::as_str), Some("close"));
        assert!(!calls.contains(&format!("navigate {DOWNLOAD_URL}")));

        let sent = notifier.relay().sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["me@example.com"]);
        let attachment = sent[0].attachment.as_ref().unwrap();
        assert!(attachment.content.contains("Failed at stage init"));
        assert!(!attachment.content.contains("Logged in."));
    }

    #[tokio::test]
    async fn test_launch_failure_reports_init_stage() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::create_dir_all(&settings.download_dir).await.unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let launcher = FakeLauncher::new(Behaviour::FailLaunch, &calls);
        let notifier = Notifier::new(RecordingRelay::default());

        let report =
            run_edition(&settings, &date(), &book(), SECRETS, &launcher, &FakeHost, &notifier).await;

        match &report.outcome {
            RunOutcome::Failure { error } => {
                assert!(matches!(error, RetrievalError::Login(BrowserError::Launch(_))));
                assert_eq!(error.stage(), Stage::Init);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // No session was opened, so there is nothing to close
        assert_eq!(*calls.borrow(), vec!["launch".to_string()]);
        let sent = notifier.relay().sent.borrow();
        assert_eq!(sent[0].to, vec!["me@example.com"]);
        assert!(sent[0]
            .attachment
            .as_ref()
            .unwrap()
            .content
            .contains("chrome executable not found"));
    }

    #[tokio::test]
    async fn test_cookie_banner_is_dismissed_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::create_dir_all(&settings.download_dir).await.unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let launcher = FakeLauncher {
            banner_present: true,
            ..FakeLauncher::new(Behaviour::DownloadTo(settings.download_dir.clone()), &calls)
        };
        let notifier = Notifier::new(RecordingRelay::default());

        let report =
            run_edition(&settings, &date(), &book(), SECRETS, &launcher, &FakeHost, &notifier).await;

        assert!(report.outcome.is_success());
        let written = fs::read_to_string(report.log_path.unwrap()).await.unwrap();
        assert!(written.contains("Cookie banner dismissed."));
        assert!(!written.contains("No cookie banner found."));
    }

    #[tokio::test]
    async fn test_success_with_full_archive_sends_digest() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::create_dir_all(&settings.download_dir).await.unwrap();
        let seeded: Vec<ArchiveEntry> = (12..=18)
            .rev()
            .map(|d| ArchiveEntry::new(format!("{d} ottobre 2026"), format!("https://host/{d}")))
            .collect();
        fs::write(&settings.archive_path, serde_json::to_string(&seeded).unwrap())
            .await
            .unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let launcher = FakeLauncher::new(Behaviour::DownloadTo(settings.download_dir.clone()), &calls);
        let notifier = Notifier::new(RecordingRelay::default());

        let report =
            run_edition(&settings, &date(), &book(), SECRETS, &launcher, &FakeHost, &notifier).await;

        let expected_link = "https://host/il-giornale-del-19-ottobre-2026.pdf";
        match &report.outcome {
            RunOutcome::Success { link } => assert_eq!(link, expected_link),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(report.mode, Mode::Digest);

        let entries = archive::load(&settings.archive_path).await.unwrap();
        assert_eq!(entries.len(), 7);
        assert_eq!(entries[0], ArchiveEntry::new("19 ottobre 2026", expected_link));
        assert!(!entries.contains(&seeded[6]));
        assert!(!settings.download_dir.join("edition.pdf").exists());

        let sent = notifier.relay().sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@x.it", "b@x.it"]);
        assert!(sent[0].attachment.is_none());
        let html = sent[0].html_body.as_ref().unwrap();
        assert_eq!(html.matches("<br><a href=").count(), 6);
        assert_eq!(html.matches("<a href=").count(), 7);
        assert!(html.contains(expected_link));
        assert!(!html.contains("https://host/12"));

        let calls = calls.borrow();
        assert_eq!(calls.first().map(String::as_str), Some("launch"));
        assert!(calls.contains(&"fill [name=\"email\"]".to_string()));
        assert!(calls.contains(&format!("navigate {DOWNLOAD_URL}")));
        assert_eq!(calls.last().map(String::as_str), Some("close"));

        let written = fs::read_to_string(report.log_path.unwrap()).await.unwrap();
        assert!(written.contains("No cookie banner found."));
        assert!(written.ends_with("All done!"));
    }

    #[tokio::test]
    async fn test_download_timeout_closes_browser_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.timings.download_timeout = 0.05;
        fs::create_dir_all(&settings.download_dir).await.unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        // Downloads land somewhere the scraper is not watching
        let elsewhere = dir.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).await.unwrap();
        let launcher = FakeLauncher::new(Behaviour::DownloadTo(elsewhere), &calls);
        let notifier = Notifier::new(RecordingRelay::default());

        let report =
            run_edition(&settings, &date(), &book(), SECRETS, &launcher, &FakeHost, &notifier).await;

        assert!(matches!(
            report.outcome,
            RunOutcome::Failure {
                error: RetrievalError::DownloadTimeout { .. }
            }
        ));
        assert_eq!(calls.borrow().last().map(String::as_str), Some("close"));
        assert_eq!(notifier.relay().sent.borrow()[0].to, vec!["me@example.com"]);
    }

    #[tokio::test]
    async fn test_success_without_recipients_falls_back_to_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        fs::create_dir_all(&settings.download_dir).await.unwrap();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let launcher = FakeLauncher::new(Behaviour::DownloadTo(settings.download_dir.clone()), &calls);
        let notifier = Notifier::new(RecordingRelay::default());
        let lonely = AddressBook {
            sender: "me@example.com".to_string(),
            recipients: vec![],
        };

        let report =
            run_edition(&settings, &date(), &lonely, SECRETS, &launcher, &FakeHost, &notifier).await;

        assert!(report.outcome.is_success());
        assert_eq!(report.mode, Mode::ErrorReport);
        let sent = notifier.relay().sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0]
            .attachment
            .as_ref()
            .unwrap()
            .content
            .contains("no recipients"));
    }

    #[tokio::test]
    async fn test_execute_run_aborts_on_bad_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            credentials_path: dir.path().join("creds.creds"),
            key_path: dir.path().join("key.key"),
            lock_path: dir.path().join("run.lock"),
            ..settings(dir.path())
        };

        let err = execute_run(&settings, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Credentials(_)));
        // The lock is released on the way out
        let _next = RunLock::acquire(&settings.lock_path).unwrap();
    }

    #[tokio::test]
    async fn test_execute_run_ignores_lock_file_left_by_crashed_run() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            credentials_path: dir.path().join("creds.creds"),
            key_path: dir.path().join("key.key"),
            lock_path: dir.path().join("run.lock"),
            ..settings(dir.path())
        };
        fs::write(&settings.lock_path, "999999").await.unwrap();

        for offset in [0, -1] {
            // Gets past the lock and stops at the missing credentials
            let err = execute_run(&settings, offset).await.unwrap_err();
            assert!(matches!(err, AppError::Credentials(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn test_execute_run_refuses_concurrent_run() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            lock_path: dir.path().join("run.lock"),
            ..settings(dir.path())
        };
        let _held = RunLock::acquire(&settings.lock_path).unwrap();

        let err = execute_run(&settings, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Lock(_)));
    }
}
