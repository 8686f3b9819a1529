//! Runtime settings loaded from `config.yaml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Durations are given in seconds as floating point numbers.
//!
//! ```yaml
//! newspaper_name: "Giornale"
//! login_url: "https://example.com/login"
//! download_url_template: "https://example.com/edicola/{date}"
//! timings:
//!   post_navigation_settle: 15.0
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name used in subjects, link labels, and uploaded file names.
    pub newspaper_name: String,
    /// Page holding the login form.
    pub login_url: String,
    /// Per-edition URL; `{date}` is replaced with the `-`-separated display date.
    pub download_url_template: String,
    /// Directory Chrome drops downloads into.
    pub download_dir: PathBuf,
    /// Extension of the downloaded edition, without the dot.
    pub download_extension: String,
    pub archive_path: PathBuf,
    pub address_book_path: PathBuf,
    pub credentials_path: PathBuf,
    pub key_path: PathBuf,
    pub logs_dir: PathBuf,
    /// Lock file that keeps two runs from touching the JSON files at once.
    pub lock_path: PathBuf,
    pub browser: BrowserConfig,
    pub selectors: SelectorConfig,
    pub smtp: SmtpConfig,
    pub hosting: HostingConfig,
    pub timings: TimingsConfig,
    pub subjects: SubjectConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            newspaper_name: "Giornale".to_string(),
            login_url: "https://example.com/login".to_string(),
            download_url_template: "https://example.com/edicola/{date}".to_string(),
            download_dir: PathBuf::from("downloads"),
            download_extension: "pdf".to_string(),
            archive_path: PathBuf::from("archive.json"),
            address_book_path: PathBuf::from("address_book.json"),
            credentials_path: PathBuf::from("creds.creds"),
            key_path: PathBuf::from("key.key"),
            logs_dir: PathBuf::from("logs"),
            lock_path: PathBuf::from(".news_scraper.lock"),
            browser: BrowserConfig::default(),
            selectors: SelectorConfig::default(),
            smtp: SmtpConfig::default(),
            hosting: HostingConfig::default(),
            timings: TimingsConfig::default(),
            subjects: SubjectConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when it does not exist.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file not found; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let settings: Settings = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        info!("Loaded configuration");
        Ok(settings)
    }

    /// Reject URLs that would only fail later, halfway through a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sample = self.download_url("1-gennaio-2026");
        for (field, value) in [
            ("login_url", self.login_url.as_str()),
            ("download_url_template", sample.as_str()),
            ("hosting.upload_url", self.hosting.upload_url.as_str()),
        ] {
            let parsed = Url::parse(value).map_err(|source| ConfigError::Url { field, source })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Scheme {
                    field,
                    scheme: parsed.scheme().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Download URL for an edition whose display date is `date`.
    pub fn download_url(&self, date: &str) -> String {
        self.download_url_template.replace("{date}", date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Set to `false` to watch the browser while debugging.
    pub headless: bool,
    /// Chrome/Chromium binary; autodetected when unset.
    pub executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
        }
    }
}

/// How the login page elements are found.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// XPath of the cookie banner button. The banner is optional.
    pub cookie_banner: String,
    /// `name` attribute of the e-mail field.
    pub email_field: String,
    /// `name` attribute of the password field.
    pub password_field: String,
    /// XPath of the submit button.
    pub submit_button: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cookie_banner: "//button[contains(., 'Ho capito')]".to_string(),
            email_field: "email".to_string(),
            password_field: "password".to_string(),
            submit_button: "//button[contains(., 'Accedi')]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    /// Implicit-TLS port.
    pub port: u16,
    /// Connection timeout in seconds.
    pub timeout: f64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 465,
            timeout: 60.0,
        }
    }
}

impl SmtpConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostingConfig {
    /// Multipart upload endpoint of the file host.
    pub upload_url: String,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://tmpfile.link/api/upload".to_string(),
        }
    }
}

/// Fixed waits of the retrieval state machine, in seconds.
///
/// These are not adaptive. On a slow connection the settle delays are the
/// first thing to raise; they are also the most likely cause of flaky runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingsConfig {
    /// Bound on each login element lookup.
    pub login_wait: f64,
    /// Bound on the optional cookie banner lookup.
    pub banner_wait: f64,
    /// Pause between login and navigating to the edition.
    pub pre_navigation_settle: f64,
    /// Pause after navigating to the edition.
    pub post_navigation_settle: f64,
    /// Total time to wait for the downloaded file.
    pub download_timeout: f64,
    /// Interval between download directory scans.
    pub download_poll: f64,
    /// Pause after the upload before the link is archived.
    pub upload_settle: f64,
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            login_wait: 20.0,
            banner_wait: 5.0,
            pre_navigation_settle: 5.0,
            post_navigation_settle: 10.0,
            download_timeout: 30.0,
            download_poll: 1.0,
            upload_settle: 10.0,
        }
    }
}

impl TimingsConfig {
    pub fn login_wait(&self) -> Duration {
        secs(self.login_wait)
    }

    pub fn banner_wait(&self) -> Duration {
        secs(self.banner_wait)
    }

    pub fn pre_navigation_settle(&self) -> Duration {
        secs(self.pre_navigation_settle)
    }

    pub fn post_navigation_settle(&self) -> Duration {
        secs(self.post_navigation_settle)
    }

    pub fn download_timeout(&self) -> Duration {
        secs(self.download_timeout)
    }

    pub fn download_poll(&self) -> Duration {
        secs(self.download_poll)
    }

    pub fn upload_settle(&self) -> Duration {
        secs(self.upload_settle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectConfig {
    /// Digest subject; `{name}` is replaced with the newspaper name.
    pub digest: String,
    pub error: String,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            digest: "Il {name} di oggi".to_string(),
            error: "NewsScraper: si è verificato un errore".to_string(),
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
