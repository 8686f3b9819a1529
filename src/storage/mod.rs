//! Files the scraper reads and writes between runs.
//!
//! # Submodules
//!
//! - [`archive`]: the last seven editions, newest first
//! - [`address_book`]: sender identity and subscribers
//! - [`run_log`]: per-run log files under the logs directory
//! - [`lock`]: lock file that serialises runs
//!
//! # Layout
//!
//! ```text
//! ./
//! ├── archive.json            # [{"19 ottobre 2026": "https://..."}, ...]
//! ├── address_book.json       # {"sender": "...", "recipients": [...]}
//! ├── .news_scraper.lock      # present only while a run is in progress
//! └── logs/
//!     └── 19_ottobre_2026.log
//! ```

pub mod address_book;
pub mod archive;
pub mod lock;
pub mod run_log;
