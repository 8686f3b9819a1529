//! Encrypted credential storage.
//!
//! Secrets live in a JSON file as `{"credentials": {"<name>": "<token>"}}`.
//! Every token is sealed with AES-256-GCM under a key kept in a separate key
//! file, so modified or swapped tokens are rejected instead of decrypting to
//! garbage.
//!
//! # Token Format
//!
//! ```text
//! base64url( [V(1)=0x01][NONCE(12)][CIPHERTEXT(N)][TAG(16)] )
//! ```
//!
//! The secret's name is bound as associated data.

use crate::error::CredentialError;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

const TOKEN_VERSION: u8 = 0x01;
const NONCE_LEN: usize = 12;

/// Name of the newspaper account e-mail.
pub const EMAIL: &str = "email";
/// Name of the newspaper account password.
pub const PASSWORD: &str = "password";
/// Name of the mail relay application token.
pub const RELAY_TOKEN: &str = "relay_token";

/// Decrypted secrets, keyed by name.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(BTreeMap<String, String>);

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

impl Credentials {
    /// Read the key file and the credentials file and decrypt every token.
    ///
    /// # Arguments
    ///
    /// * `credentials_path` - JSON file with the `credentials` section
    /// * `key_path` - File holding the base64url AES-256 key
    ///
    /// # Errors
    ///
    /// [`CredentialError::Decryption`] for a missing or malformed key and for
    /// any token that fails authentication; no partial result is returned.
    #[instrument(level = "info", skip_all, fields(credentials = %credentials_path.display()))]
    pub async fn decrypt(credentials_path: &Path, key_path: &Path) -> Result<Self, CredentialError> {
        let cipher = load_cipher(key_path).await?;
        let raw = fs::read_to_string(credentials_path)
            .await
            .map_err(|source| CredentialError::Io {
                path: credentials_path.to_path_buf(),
                source,
            })?;
        let document: serde_json::Value = serde_json::from_str(&raw)?;
        let tokens: BTreeMap<String, String> = match document.get("credentials") {
            Some(section) => serde_json::from_value(section.clone())?,
            None => {
                return Err(CredentialError::Decryption(
                    "credentials file has no \"credentials\" section".to_string(),
                ));
            }
        };

        let mut secrets = BTreeMap::new();
        for (name, token) in tokens {
            let plaintext = open_token(&cipher, &name, &token)?;
            secrets.insert(name, plaintext);
        }
        info!(count = secrets.len(), "Decrypted credentials");
        Ok(Self(secrets))
    }

    /// Plaintext of the secret called `name`.
    ///
    /// # Errors
    ///
    /// [`CredentialError::Missing`] when the credentials file has no such entry.
    pub fn get(&self, name: &str) -> Result<&str, CredentialError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| CredentialError::Missing(name.to_string()))
    }
}

/// Encrypt `secrets` under a freshly generated key.
///
/// The tokens are merged into the `credentials` section of
/// `credentials_path` (other top-level keys are kept) and the key is written
/// to `key_path`, replacing any previous key.
#[instrument(level = "info", skip_all, fields(credentials = %credentials_path.display(), key = %key_path.display()))]
pub async fn seal(
    secrets: &BTreeMap<String, String>,
    credentials_path: &Path,
    key_path: &Path,
) -> Result<(), CredentialError> {
    let key = Aes256Gcm::generate_key(&mut OsRng);
    let cipher = Aes256Gcm::new(&key);

    let mut document = match fs::read_to_string(credentials_path).await {
        Ok(raw) => serde_json::from_str::<serde_json::Value>(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(source) => {
            return Err(CredentialError::Io {
                path: credentials_path.to_path_buf(),
                source,
            });
        }
    };

    let mut tokens = serde_json::Map::new();
    for (name, value) in secrets {
        tokens.insert(name.clone(), seal_token(&cipher, name, value)?.into());
    }
    match document.as_object_mut() {
        Some(object) => {
            object.insert("credentials".to_string(), tokens.into());
        }
        None => {
            return Err(CredentialError::Decryption(
                "credentials file is not a JSON object".to_string(),
            ));
        }
    }

    let serialized = serde_json::to_string(&document)?;
    fs::write(credentials_path, serialized)
        .await
        .map_err(|source| CredentialError::Io {
            path: credentials_path.to_path_buf(),
            source,
        })?;
    fs::write(key_path, URL_SAFE.encode(key))
        .await
        .map_err(|source| CredentialError::Io {
            path: key_path.to_path_buf(),
            source,
        })?;
    info!(count = secrets.len(), "Sealed credentials");
    Ok(())
}

async fn load_cipher(key_path: &Path) -> Result<Aes256Gcm, CredentialError> {
    let encoded = fs::read_to_string(key_path).await.map_err(|e| {
        CredentialError::Decryption(format!("cannot read key file {}: {e}", key_path.display()))
    })?;
    let key = URL_SAFE
        .decode(encoded.trim())
        .map_err(|e| CredentialError::Decryption(format!("key file is not base64: {e}")))?;
    Aes256Gcm::new_from_slice(&key)
        .map_err(|_| CredentialError::Decryption(format!("key must be 32 bytes, got {}", key.len())))
}

fn seal_token(cipher: &Aes256Gcm, name: &str, value: &str) -> Result<String, CredentialError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: value.as_bytes(),
                aad: name.as_bytes(),
            },
        )
        .map_err(|_| CredentialError::Decryption(format!("could not encrypt {name}")))?;

    let mut blob = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    blob.push(TOKEN_VERSION);
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(URL_SAFE.encode(blob))
}

fn open_token(cipher: &Aes256Gcm, name: &str, token: &str) -> Result<String, CredentialError> {
    let blob = URL_SAFE
        .decode(token.trim())
        .map_err(|e| CredentialError::Decryption(format!("{name}: token is not base64: {e}")))?;
    if blob.len() < 1 + NONCE_LEN || blob[0] != TOKEN_VERSION {
        return Err(CredentialError::Decryption(format!(
            "{name}: unsupported or truncated token"
        )));
    }
    let (nonce, ciphertext) = blob[1..].split_at(NONCE_LEN);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: name.as_bytes(),
            },
        )
        .map_err(|_| CredentialError::Decryption(format!("{name}: token failed authentication")))?;
    String::from_utf8(plaintext)
        .map_err(|_| CredentialError::Decryption(format!("{name}: plaintext is not UTF-8")))
}
