/// Certificate selection
use crate::{
    error::{SignerError, SignerResult},
    signing::CertificateBinding,
};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

const VALID_TO_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Return the first binding whose credential stays valid for longer than
/// `now + margin`.
///
/// Bindings that fail the check are logged and skipped but stay in the
/// list; every call scans from the top, so callers wanting rotation must
/// hand in differently ordered lists.
pub fn select_certificate<'a>(
    bindings: &'a [CertificateBinding],
    worker: Option<usize>,
    margin: Duration,
    now: DateTime<Utc>,
) -> SignerResult<&'a CertificateBinding> {
    let margin_ms = i64::try_from(margin.as_millis()).unwrap_or(i64::MAX);
    let deadline = now + chrono::Duration::milliseconds(margin_ms);

    for binding in bindings {
        if binding.local.valid_to > deadline {
            return Ok(binding);
        }

        warn!(
            "{}invalid certificate: {} valid to {}",
            worker_tag(worker),
            binding.local.subject_name,
            binding.local.valid_to.format(VALID_TO_FORMAT)
        );
    }

    Err(SignerError::NoSuitableCredential)
}

fn worker_tag(worker: Option<usize>) -> String {
    worker.map(|w| format!("[{}] ", w)).unwrap_or_default()
}
