//! Browser capability used by the retrieval state machine.
//!
//! [`BrowserLauncher`] hands out a [`BrowserSession`]; the session drives a
//! single page. The production implementation runs headless Chrome through
//! `chromiumoxide` with downloads allowed into the configured directory.
//! Tests substitute their own sessions.

use crate::config::BrowserConfig;
use crate::error::BrowserError;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Element, Page};
use futures::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

/// Interval between element lookups while waiting for an element.
const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Match on the `name` attribute.
    Name(String),
    XPath(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Name(name) => write!(f, "[name=\"{name}\"]"),
            Locator::XPath(xpath) => write!(f, "xpath:{xpath}"),
        }
    }
}

/// Starts browser sessions.
pub trait BrowserLauncher {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, BrowserError>;
}

/// One live browser with one page.
///
/// Lookups wait up to `timeout` for the element to appear. `close` must be
/// called on every path once the session is no longer needed.
pub trait BrowserSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError>;

    async fn fill(&mut self, locator: &Locator, text: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn close(self) -> Result<(), BrowserError>;
}

/// Launches Chrome through `chromiumoxide`.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: BrowserConfig,
    download_dir: PathBuf,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig, download_dir: &Path) -> Self {
        Self {
            config,
            download_dir: download_dir.to_path_buf(),
        }
    }
}

impl BrowserLauncher for ChromeLauncher {
    type Session = ChromeSession;

    #[instrument(level = "info", skip_all, fields(headless = self.config.headless))]
    async fn launch(&self) -> Result<ChromeSession, BrowserError> {
        let mut builder = ChromeConfig::builder()
            .no_sandbox()
            .request_timeout(Duration::from_secs(30))
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref exe) = self.config.executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The CDP event loop must be polled for any command to complete
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let mut session = ChromeSession {
            browser,
            page: None,
            handler: handler_task,
        };
        if let Err(e) = session.prepare(&self.download_dir).await {
            let _ = session.shutdown().await;
            return Err(e);
        }
        info!("Browser launched");
        Ok(session)
    }
}

/// A running Chrome plus the page used for the whole run.
pub struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler: JoinHandle<()>,
}

impl ChromeSession {
    async fn prepare(&mut self, download_dir: &Path) -> Result<(), BrowserError> {
        let download_dir = std::fs::canonicalize(download_dir)
            .map_err(|e| BrowserError::Launch(format!("download dir {}: {e}", download_dir.display())))?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy().into_owned())
            .build()
            .map_err(BrowserError::Launch)?;
        self.browser
            .execute(params)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        self.page = Some(page);
        debug!(dir = %download_dir.display(), "Downloads allowed");
        Ok(())
    }

    fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Command("no page open".to_string()))
    }

    async fn find_once(&self, locator: &Locator) -> Result<Element, BrowserError> {
        let page = self.page()?;
        let found = match locator {
            Locator::Name(name) => page.find_element(format!("[name=\"{name}\"]")).await,
            Locator::XPath(xpath) => page.find_xpath(xpath.as_str()).await,
        };
        found.map_err(|e| BrowserError::Command(e.to_string()))
    }

    /// Poll for `locator` until it shows up or `timeout` passes.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<Element, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_once(locator).await {
                Ok(element) => return Ok(element),
                Err(e) if Instant::now() >= deadline => {
                    debug!(%locator, error = %e, "Element lookup gave up");
                    return Err(BrowserError::ElementNotFound {
                        locator: locator.to_string(),
                        waited: timeout,
                    });
                }
                Err(_) => sleep(ELEMENT_POLL).await,
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), BrowserError> {
        let closed = self.browser.close().await.map(|_| ());
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed.map_err(|e| BrowserError::Command(format!("close: {e}")))
    }
}

impl BrowserSession for ChromeSession {
    #[instrument(level = "info", skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        match self.page()?.goto(url).await {
            Ok(_) => Ok(()),
            // Chrome aborts the navigation once the response turns into a download
            Err(e) if e.to_string().contains("ERR_ABORTED") => {
                debug!(error = %e, "Navigation turned into a download");
                Ok(())
            }
            Err(e) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn click(&mut self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError> {
        let element = self.wait_for(locator, timeout).await?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Command(format!("click {locator}: {e}")))?;
        Ok(())
    }

    async fn fill(&mut self, locator: &Locator, text: &str, timeout: Duration) -> Result<(), BrowserError> {
        let element = self.wait_for(locator, timeout).await?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::Command(format!("focus {locator}: {e}")))?
            .type_str(text)
            .await
            .map_err(|e| BrowserError::Command(format!("type into {locator}: {e}")))?;
        Ok(())
    }

    async fn close(mut self) -> Result<(), BrowserError> {
        let result = self.shutdown().await;
        if let Err(ref e) = result {
            warn!(error = %e, "Browser did not close cleanly");
        }
        result
    }
}
