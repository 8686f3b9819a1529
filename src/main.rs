//! # News Scraper
//!
//! Fetches the day's newspaper edition as a PDF through a headless Chrome
//! session, shares it through a temporary file host, keeps a rolling archive
//! of the last week's links, and mails the digest to a small subscriber list.
//!
//! ## Usage
//!
//! ```sh
//! news_scraper            # today's edition
//! news_scraper -y         # yesterday's edition
//! news_scraper -i         # maintenance shell
//! ```
//!
//! ## Architecture
//!
//! One run is a straight line:
//! 1. **Setup**: config, output directories, run lock, credentials, address book
//! 2. **Retrieval**: login, navigate to the dated edition, wait for the download
//! 3. **Hosting**: upload the PDF, prepend the link to the archive, delete the file
//! 4. **Notification**: the digest on success, otherwise the run log to the sender
//!
//! Only setup failures end the process with an error; everything after that
//! is reported by mail and in `logs/`.

use clap::Parser;
use std::collections::BTreeMap;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod credentials;
mod error;
mod hosting;
mod interactive;
mod mailer;
mod models;
mod pipeline;
mod scrapers;
mod storage;
mod utils;

use cli::Cli;
use config::Settings;
use models::RunOutcome;
use pipeline::execute_run;

#[tokio::main(flavor = "current_thread")]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_scraper starting up");

    let args = Cli::parse();
    debug!(?args.config, args.interactive, args.yesterday, "Parsed CLI arguments");

    let settings = Settings::load(&args.config)?;

    if let Some(ref plaintext) = args.seal_credentials {
        let raw = tokio::fs::read_to_string(plaintext).await?;
        let secrets: BTreeMap<String, String> = serde_json::from_str(&raw)?;
        credentials::seal(&secrets, &settings.credentials_path, &settings.key_path).await?;
        info!(
            count = secrets.len(),
            credentials = %settings.credentials_path.display(),
            "Credentials sealed; remove the plaintext file"
        );
        return Ok(());
    }

    if args.interactive {
        interactive::run_loop(&settings, async |offset| execute_run(&settings, offset).await).await?;
        return Ok(());
    }

    let report = match execute_run(&settings, args.offset()).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Run aborted before retrieval");
            return Err(e.into());
        }
    };

    let failed_at = match report.outcome {
        RunOutcome::Success { .. } => None,
        RunOutcome::Failure { ref error } => Some(error.stage()),
    };
    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        success = report.outcome.is_success(),
        failed_at = ?failed_at,
        mode = ?report.mode,
        notified = report.notified,
        log = ?report.log_path,
        "Execution complete"
    );

    Ok(())
}
