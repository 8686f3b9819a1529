//! Outbound mail: the daily digest and the error report.
//!
//! # Submodules
//!
//! - [`digest`]: renders the digest bodies from the archive
//! - [`smtp`]: [`SmtpRelay`](smtp::SmtpRelay), the production [`MailRelay`]
//!
//! # Delivery Policy
//!
//! Notification is best effort. A relay failure is written to the run log
//! and to `tracing`, then dropped; a run never fails because a mail did.

pub mod digest;
pub mod smtp;

use crate::config::Settings;
use crate::error::NotificationError;
use crate::models::{AddressBook, RunLog};
use crate::storage::archive;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Body text of the error report.
pub const ERROR_BODY: &str = "Vedere il log in allegato.";

/// A text file attached to a mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content: String,
}

/// A fully composed mail, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub attachment: Option<Attachment>,
}

/// Hands composed mails to a delivery service.
pub trait MailRelay {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotificationError>;
}

/// Which of the two mails to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Latest edition plus older ones, to every subscriber.
    Digest,
    /// Run log attached, to the sender only.
    ErrorReport,
}

/// Build the digest for every recipient from the archive at `archive_path`.
#[instrument(level = "info", skip_all, fields(archive = %archive_path.display()))]
pub async fn compose_digest(
    settings: &Settings,
    book: &AddressBook,
    archive_path: &Path,
) -> Result<OutgoingEmail, NotificationError> {
    if book.recipients.is_empty() {
        return Err(NotificationError::NoRecipients);
    }
    let (latest, older) = archive::latest_and_rest(archive_path)
        .await
        .map_err(|e| NotificationError::Compose(e.to_string()))?;

    let name = &settings.newspaper_name;
    info!(older = older.len(), latest = %latest.date, "Digest composed");
    Ok(OutgoingEmail {
        from: book.sender.clone(),
        to: book.recipients.clone(),
        subject: settings.subjects.digest.replace("{name}", name),
        text_body: digest::text_body(name, &latest, &older),
        html_body: Some(digest::html_body(name, &latest, &older)),
        attachment: None,
    })
}

/// Build the error report carrying `log` as `log_file_name`.
pub fn compose_error_report(
    settings: &Settings,
    book: &AddressBook,
    log: &RunLog,
    log_file_name: &str,
) -> OutgoingEmail {
    OutgoingEmail {
        from: book.sender.clone(),
        to: vec![book.sender.clone()],
        subject: settings.subjects.error.clone(),
        text_body: ERROR_BODY.to_string(),
        html_body: None,
        attachment: Some(Attachment {
            filename: log_file_name.to_string(),
            content: log.as_str().to_string(),
        }),
    }
}

/// Sends mails through a relay without ever failing the run.
#[derive(Debug)]
pub struct Notifier<R> {
    relay: R,
}

impl<R: MailRelay> Notifier<R> {
    pub fn new(relay: R) -> Self {
        Self { relay }
    }

    /// Send `email`; a failure is logged and swallowed.
    ///
    /// Returns whether the relay accepted the mail.
    #[instrument(level = "info", skip_all, fields(subject = %email.subject, recipients = email.to.len()))]
    pub async fn deliver(&self, email: &OutgoingEmail, log: &mut RunLog) -> bool {
        match self.relay.send(email).await {
            Ok(()) => {
                log.note("Email sent.");
                true
            }
            Err(e) => {
                warn!(error = %e, "Notification failed");
                log.failure(format!("Email not sent: {e}"));
                false
            }
        }
    }

    #[cfg(test)]
    pub fn relay(&self) -> &R {
        &self.relay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArchiveEntry;
    use std::cell::RefCell;
    use tokio::fs;

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

    struct DownRelay;

    impl MailRelay for DownRelay {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), NotificationError> {
            Err(NotificationError::Relay("connection refused".to_string()))
        }
    }

    fn book() -> AddressBook {
        AddressBook {
            sender: "me@example.com".to_string(),
            recipients: vec!["a@x.it".to_string(), "b@x.it".to_string()],
        }
    }

    #[tokio::test]
    async fn test_compose_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");
        let entries = vec![
            ArchiveEntry::new("19 ottobre 2026", "https://host/19"),
            ArchiveEntry::new("18 ottobre 2026", "https://host/18"),
        ];
        fs::write(&path, serde_json::to_string(&entries).unwrap())
            .await
            .unwrap();
        let settings = Settings::default();

        let email = compose_digest(&settings, &book(), &path).await.unwrap();

        assert_eq!(email.from, "me@example.com");
        assert_eq!(email.to, vec!["a@x.it", "b@x.it"]);
        assert_eq!(email.subject, "Il Giornale di oggi");
        assert!(email.attachment.is_none());
        let html = email.html_body.unwrap();
        assert_eq!(html.matches("<br><a href=").count(), 1);
        assert!(html.contains("https://host/19"));
    }

    #[tokio::test]
    async fn test_compose_digest_needs_recipients_and_editions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");
        let settings = Settings::default();

        let lonely = AddressBook {
            sender: "me@example.com".to_string(),
            recipients: vec![],
        };
        assert!(matches!(
            compose_digest(&settings, &lonely, &path).await,
            Err(NotificationError::NoRecipients)
        ));
        assert!(matches!(
            compose_digest(&settings, &book(), &path).await,
            Err(NotificationError::Compose(_))
        ));
    }

    #[test]
    fn test_error_report_goes_to_sender_only() {
        let mut log = RunLog::start();
        log.failure("navigation failed");
        let email = compose_error_report(&Settings::default(), &book(), &log, "19_ottobre_2026.log");

        assert_eq!(email.to, vec!["me@example.com"]);
        assert_eq!(email.subject, "NewsScraper: si è verificato un errore");
        assert_eq!(email.text_body, ERROR_BODY);
        let attachment = email.attachment.unwrap();
        assert_eq!(attachment.filename, "19_ottobre_2026.log");
        assert!(attachment.content.contains("navigation failed"));
    }

    #[tokio::test]
    async fn test_deliver_records_success() {
        let notifier = Notifier::new(RecordingRelay::default());
        let mut log = RunLog::start();
        let email = compose_error_report(&Settings::default(), &book(), &log.clone(), "x.log");

        assert!(notifier.deliver(&email, &mut log).await);
        assert_eq!(notifier.relay().sent.borrow().len(), 1);
        assert!(log.as_str().ends_with("Email sent."));
    }

    #[tokio::test]
    async fn test_deliver_swallows_relay_failure() {
        let notifier = Notifier::new(DownRelay);
        let mut log = RunLog::start();
        let email = compose_error_report(&Settings::default(), &book(), &log.clone(), "x.log");

        assert!(!notifier.deliver(&email, &mut log).await);
        assert!(log.as_str().contains("connection refused"));
    }
}
