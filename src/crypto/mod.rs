/// Credential store and signing capability
///
/// The signing engine never touches key material directly. It lists the
/// credentials available on this machine and asks the store to sign a
/// payload with one of them. Platform certificate stores and the
/// file-backed `KeyFileStore` both sit behind `CredentialStore`.

pub mod keyfile;

pub use keyfile::KeyFileStore;

use crate::error::SignerResult;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Base64 payload used to probe whether a credential can actually sign
pub const TEST_PAYLOAD: &str = "dGVzdA==";

/// Signing credential available on this machine
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCredential {
    /// Normalized thumbprint (see `normalize_thumbprint`)
    pub thumbprint: String,
    pub subject_name: String,
    pub valid_to: DateTime<Utc>,
}

/// Source of local credentials and the opaque signing primitive
///
/// Implementations are sync, signing is CPU-bound or blocks on a device.
/// Callers on the async side go through `spawn_blocking`.
pub trait CredentialStore: Send + Sync {
    /// Credentials keyed by normalized thumbprint
    fn list_local_credentials(&self) -> SignerResult<HashMap<String, LocalCredential>>;

    /// Sign base64 content, returning a base64 signature
    fn sign(&self, credential: &LocalCredential, payload_base64: &str) -> SignerResult<String>;
}

/// Bring a certificate thumbprint into the form used for matching:
/// the portal's `0x` prefix becomes `00`, separators are dropped and hex
/// digits are upper-cased.
pub fn normalize_thumbprint(thumbprint: &str) -> String {
    thumbprint
        .trim()
        .replace("0x", "00")
        .replace("0X", "00")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}
