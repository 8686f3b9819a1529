//! Read/modify/write helpers for `address_book.json`.

use crate::error::AddressBookError;
use crate::models::AddressBook;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Read the address book at `path`.
///
/// # Errors
///
/// [`AddressBookError::Io`] when the file cannot be read (a missing address
/// book is not defaulted), [`AddressBookError::Malformed`] when it is not a
/// `{"sender", "recipients"}` object.
pub async fn load(path: &Path) -> Result<AddressBook, AddressBookError> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|source| AddressBookError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| AddressBookError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Overwrite `path` with `book`.
pub async fn save(path: &Path, book: &AddressBook) -> Result<(), AddressBookError> {
    let json = serde_json::to_string(book).map_err(|source| AddressBookError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json)
        .await
        .map_err(|source| AddressBookError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Append `recipient` and persist. Duplicates are kept.
#[instrument(level = "info", skip_all, fields(path = %path.display(), %recipient))]
pub async fn add_recipient(path: &Path, recipient: &str) -> Result<AddressBook, AddressBookError> {
    let mut book = load(path).await?;
    book.add_recipient(recipient);
    save(path, &book).await?;
    info!(count = book.recipients.len(), "Recipient added");
    Ok(book)
}

/// Remove the first occurrence of `recipient`.
///
/// Returns `Ok(false)` without touching the file when it is not listed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), %recipient))]
pub async fn remove_recipient(path: &Path, recipient: &str) -> Result<bool, AddressBookError> {
    let mut book = load(path).await?;
    if !book.remove_recipient(recipient) {
        info!("Recipient not in address book");
        return Ok(false);
    }
    save(path, &book).await?;
    info!(count = book.recipients.len(), "Recipient removed");
    Ok(true)
}
