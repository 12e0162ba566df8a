/// Document signing engine
///
/// - `selector` picks the certificate to sign with
/// - `pipeline` runs the per-document stages over one worker's partition
/// - `dispatcher` fans a batch out over the worker pool and merges results

pub mod dispatcher;
pub mod pipeline;
pub mod selector;

pub use dispatcher::{dispatch, partition, BatchResult};
pub use pipeline::{run_partition, sign_document};
pub use selector::select_certificate;

use crate::{
    crypto::{CredentialStore, LocalCredential},
    error::{SignerError, SignerResult},
    portal::{Portal, RemoteCertificate},
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// Remote certificate paired with the local credential holding its key
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateBinding {
    pub remote: RemoteCertificate,
    pub local: LocalCredential,
}

/// Outcome of one worker partition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SigningResult {
    /// Documents signed and stored on the portal
    pub signed: usize,
    /// Ids of documents that failed with a recoverable error
    pub failed: Vec<String>,
}

impl SigningResult {
    pub fn merge(&mut self, other: SigningResult) {
        self.signed += other.signed;
        self.failed.extend(other.failed);
    }
}

/// Shared collaborators of all workers in a batch
#[derive(Clone)]
pub struct SigningContext {
    pub portal: Arc<dyn Portal>,
    pub store: Arc<dyn CredentialStore>,
    pub cancel: CancellationToken,
    /// Minimum remaining certificate lifetime
    pub safety_margin: Duration,
    /// Delay after each processed document
    pub pacing: Duration,
}

/// Fail with `StopRequested` if cancellation was requested
pub fn check_cancelled(cancel: &CancellationToken) -> SignerResult<()> {
    if cancel.is_cancelled() {
        Err(SignerError::StopRequested)
    } else {
        Ok(())
    }
}

/// Run `fut` unless cancellation arrives first
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> SignerResult<T>
where
    F: Future<Output = SignerResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SignerError::StopRequested),
        result = fut => result,
    }
}

/// Sleep for `duration`, waking early with `StopRequested` on cancellation
pub async fn sleep_cancellable(cancel: &CancellationToken, duration: Duration) -> SignerResult<()> {
    if duration.is_zero() {
        return check_cancelled(cancel);
    }
    until_cancelled(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_results() {
        let mut total = SigningResult {
            signed: 2,
            failed: vec!["a".to_string()],
        };
        total.merge(SigningResult {
            signed: 1,
            failed: vec!["b".to_string(), "c".to_string()],
        });
        assert_eq!(total.signed, 3);
        assert_eq!(total.failed, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_until_cancelled_stops_pending_work() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: SignerResult<()> = until_cancelled(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(SignerError::StopRequested)));
    }

    #[tokio::test]
    async fn test_sleep_cancellable_wakes_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = sleep_cancellable(&cancel, Duration::from_secs(30)).await;

        assert!(matches!(result, Err(SignerError::StopRequested)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_sleep_only_checks_token() {
        let cancel = CancellationToken::new();
        assert!(sleep_cancellable(&cancel, Duration::ZERO).await.is_ok());
    }
}
