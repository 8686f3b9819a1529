//! Browser-driven retrieval of the daily edition.
//!
//! The work is split in two phases, mirroring what a reader would do by hand:
//!
//! 1. **Browsing**: log in, open the edition page, wait for the PDF to land
//!    in the download directory ([`browser`] provides the session)
//! 2. **Sharing**: upload the PDF and archive the link ([`crate::hosting`])
//!
//! [`retrieval::scrape`] runs both phases and always yields a
//! [`RunOutcome`](crate::models::RunOutcome); failures never escape as errors.

pub mod browser;
pub mod retrieval;
