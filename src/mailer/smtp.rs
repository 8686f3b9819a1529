//! SMTP delivery through `mail-send`.

use super::{MailRelay, OutgoingEmail};
use crate::config::SmtpConfig;
use crate::error::NotificationError;
use mail_builder::MessageBuilder;
use mail_send::SmtpClientBuilder;
use std::fmt;
use std::time::Instant;
use tracing::{info, instrument};

/// Implicit-TLS SMTP relay authenticated with an application token.
pub struct SmtpRelay {
    config: SmtpConfig,
    username: String,
    token: String,
}

impl fmt::Debug for SmtpRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpRelay")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl SmtpRelay {
    /// Relay for `config`, logging in as `username` with the application `token`.
    pub fn new(config: SmtpConfig, username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            config,
            username: username.into(),
            token: token.into(),
        }
    }
}

/// Turn an [`OutgoingEmail`] into a MIME message.
pub fn build_message(email: &OutgoingEmail) -> MessageBuilder<'_> {
    let to: Vec<&str> = email.to.iter().map(String::as_str).collect();
    let mut message = MessageBuilder::new()
        .from(email.from.as_str())
        .to(to)
        .subject(email.subject.as_str())
        .text_body(email.text_body.as_str());
    if let Some(ref html) = email.html_body {
        message = message.html_body(html.as_str());
    }
    if let Some(ref attachment) = email.attachment {
        message = message.attachment(
            "text/plain",
            attachment.filename.as_str(),
            attachment.content.as_str(),
        );
    }
    message
}

impl MailRelay for SmtpRelay {
    #[instrument(level = "info", skip_all, fields(host = %self.config.host, recipients = email.to.len()))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotificationError> {
        let t0 = Instant::now();
        let relay_err = |e: mail_send::Error| NotificationError::Relay(e.to_string());

        let mut client = SmtpClientBuilder::new(self.config.host.as_str(), self.config.port)
            .implicit_tls(true)
            .timeout(self.config.timeout())
            .credentials((self.username.as_str(), self.token.as_str()))
            .connect()
            .await
            .map_err(relay_err)?;
        client.send(build_message(email)).await.map_err(relay_err)?;
        let _ = client.quit().await;

        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            "Email handed to relay"
        );
        Ok(())
    }
}
