/// File-backed credential store
///
/// Reads signing keys from a JSON file:
///
/// ```json
/// [
///   {
///     "thumbprint": "3F5A...",
///     "subject_name": "CN=Clinic",
///     "valid_to": "2026-12-31T23:59:59Z",
///     "private_key_hex": "0123..."
///   }
/// ]
/// ```
///
/// Signatures are secp256k1 ECDSA over the SHA-256 digest of the decoded
/// payload, returned as base64 of the 64-byte fixed encoding. The file is
/// re-read on every listing so rotated keys are picked up without a
/// restart.
use crate::{
    crypto::{normalize_thumbprint, CredentialStore, LocalCredential},
    error::{SignerError, SignerResult},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use k256::{
    ecdsa::{signature::DigestSigner, Signature, SigningKey},
    SecretKey,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};
use tracing::{debug, warn};

/// One entry of the key file
#[derive(Debug, Clone, Deserialize)]
struct KeyFileEntry {
    thumbprint: String,
    subject_name: String,
    valid_to: DateTime<Utc>,
    private_key_hex: String,
}

/// Credential store backed by a JSON key file
pub struct KeyFileStore {
    path: PathBuf,
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl KeyFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> SignerResult<Vec<KeyFileEntry>> {
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data).map_err(|e| {
            SignerError::Crypto(format!("Invalid key file {}: {}", self.path.display(), e))
        })
    }
}

/// Parse a hex-encoded 32-byte secp256k1 private key
fn signing_key_from_hex(hex_key: &str) -> SignerResult<SigningKey> {
    let key_bytes = hex::decode(hex_key.trim())
        .map_err(|e| SignerError::Crypto(format!("Invalid hex private key: {}", e)))?;

    if key_bytes.len() != 32 {
        return Err(SignerError::Crypto(
            "Private key must be exactly 32 bytes".to_string(),
        ));
    }

    let secret_key = SecretKey::from_slice(&key_bytes)
        .map_err(|e| SignerError::Crypto(format!("Invalid private key: {}", e)))?;

    Ok(SigningKey::from(secret_key))
}

/// Sign base64 content with the given key
fn sign_payload(key: &SigningKey, payload_base64: &str) -> SignerResult<String> {
    let content = STANDARD
        .decode(payload_base64.trim())
        .map_err(|e| SignerError::Crypto(format!("Payload is not valid base64: {}", e)))?;

    let digest = Sha256::new_with_prefix(&content);
    let signature: Signature = key
        .try_sign_digest(digest)
        .map_err(|e| SignerError::Crypto(format!("Sign: {}", e)))?;

    Ok(STANDARD.encode(signature.to_bytes()))
}

impl CredentialStore for KeyFileStore {
    fn list_local_credentials(&self) -> SignerResult<HashMap<String, LocalCredential>> {
        let entries = self.read_entries()?;

        let mut credentials = HashMap::new();
        let mut keys = HashMap::new();

        for entry in entries {
            let thumbprint = normalize_thumbprint(&entry.thumbprint);
            match signing_key_from_hex(&entry.private_key_hex) {
                Ok(key) => {
                    keys.insert(thumbprint.clone(), key);
                    credentials.insert(
                        thumbprint.clone(),
                        LocalCredential {
                            thumbprint,
                            subject_name: entry.subject_name,
                            valid_to: entry.valid_to,
                        },
                    );
                }
                Err(e) => warn!("Skipping key {} ({}): {}", thumbprint, entry.subject_name, e),
            }
        }

        debug!(
            "Loaded {} credential(s) from {}",
            credentials.len(),
            self.path.display()
        );

        *self
            .keys
            .write()
            .map_err(|_| SignerError::Internal("Key map lock poisoned".to_string()))? = keys;

        Ok(credentials)
    }

    fn sign(&self, credential: &LocalCredential, payload_base64: &str) -> SignerResult<String> {
        if credential.valid_to <= Utc::now() {
            return Err(SignerError::Crypto(format!(
                "Certificate {} expired at {}",
                credential.subject_name, credential.valid_to
            )));
        }

        let keys = self
            .keys
            .read()
            .map_err(|_| SignerError::Internal("Key map lock poisoned".to_string()))?;

        let key = keys.get(&credential.thumbprint).ok_or_else(|| {
            SignerError::Crypto(format!(
                "No private key for certificate {}",
                credential.thumbprint
            ))
        })?;

        sign_payload(key, payload_base64)
    }
}
