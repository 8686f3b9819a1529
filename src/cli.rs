//! Command-line interface definitions for the news scraper.
//!
//! All options can be given as flags; the config path can also come from
//! the environment.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Without flags the scraper retrieves today's edition and exits.
///
/// # Examples
///
/// ```sh
/// # Today's edition
/// news_scraper
///
/// # Yesterday's edition, custom config
/// news_scraper --yesterday -c /etc/news_scraper.yaml
///
/// # Maintenance shell
/// news_scraper -i
///
/// # Encrypt a plaintext {"email": ..., "password": ..., "relay_token": ...} file
/// news_scraper --seal-credentials secrets.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Open the interactive shell (takes precedence over --yesterday)
    #[arg(short, long)]
    pub interactive: bool,

    /// Retrieve yesterday's edition instead of today's
    #[arg(short, long)]
    pub yesterday: bool,

    /// Path to config.yaml; a missing file means built-in defaults
    #[arg(short, long, env = "NEWS_SCRAPER_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Encrypt the plaintext JSON secrets at this path into the credentials file, then exit
    #[arg(long, value_name = "JSON")]
    pub seal_credentials: Option<PathBuf>,
}

impl Cli {
    /// Day offset for a non-interactive run.
    pub fn offset(&self) -> i64 {
        if self.yesterday { -1 } else { 0 }
    }
}
