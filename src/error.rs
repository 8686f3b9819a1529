//! Error types for the scraper.
//!
//! Each concern gets its own enum so the driver can tell the fatal set
//! (configuration, lock, credentials) apart from the failures that only
//! degrade a run into an error report.

use crate::models::Stage;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures while reading or sealing the encrypted credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Bad key file, bad token, or a token that fails authentication.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A secret the run needs is absent from the credentials file.
    #[error("missing credential: {0}")]
    Missing(String),

    #[error("credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DateError {
    /// The offset moves past the range chrono can represent.
    #[error("day offset {0} is outside the representable calendar range")]
    OutOfRange(i64),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// No edition has been archived yet.
    #[error("archive {0} has no editions")]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum AddressBookError {
    #[error("address book {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("address book {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum LockError {
    /// Another run owns the lock file.
    #[error("another run is in progress (lock file {0} is held)")]
    Held(PathBuf),

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{field} is not a valid URL: {source}")]
    Url {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{field} must be http or https, not {scheme}")]
    Scheme { field: &'static str, scheme: String },
}

/// Failures raised by a browser session implementation.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("could not start the browser: {0}")]
    Launch(String),

    #[error("element {locator} not found within {waited:?}")]
    ElementNotFound { locator: String, waited: Duration },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("browser command failed: {0}")]
    Command(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("file host returned no download link")]
    MissingLink,
}

/// Everything that can stop the retrieval state machine.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("login failed: {0}")]
    Login(#[source] BrowserError),

    #[error("navigation failed: {0}")]
    Navigation(#[source] BrowserError),

    #[error("no .{extension} file appeared in {dir} within {waited:?}")]
    DownloadTimeout {
        dir: PathBuf,
        extension: String,
        waited: Duration,
    },

    #[error("could not scan download directory {dir}: {source}")]
    DownloadScan {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("archiving failed: {0}")]
    Archive(#[from] ArchiveError),
}

impl RetrievalError {
    /// The stage the state machine was unable to leave.
    pub fn stage(&self) -> Stage {
        match self {
            RetrievalError::Login(_) => Stage::Init,
            RetrievalError::Navigation(_) => Stage::LoggedIn,
            RetrievalError::DownloadTimeout { .. } | RetrievalError::DownloadScan { .. } => {
                Stage::Downloading
            }
            RetrievalError::Upload(_) | RetrievalError::Archive(_) => Stage::Downloaded,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("no recipients to notify")]
    NoRecipients,

    #[error("could not compose the digest: {0}")]
    Compose(String),

    #[error("mail relay error: {0}")]
    Relay(String),
}

/// Failures that abort a run before any retrieval is attempted.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Date(#[from] DateError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("directory {path} is not writable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    AddressBook(#[from] AddressBookError),
}
