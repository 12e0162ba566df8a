/// Polling cycle steps
use crate::{
    cache::TtlCache,
    config::Settings,
    crypto::{normalize_thumbprint, CredentialStore, TEST_PAYLOAD},
    dates::DateRange,
    error::{SignerError, SignerResult},
    portal::{Document, Portal},
    signing::{check_cancelled, until_cancelled, CertificateBinding},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Documents requested per search page
pub const PAGE_SIZE: usize = 30;

/// Upper bound on search pages per cycle, in case the portal ignores paging
const MAX_PAGES: usize = 1000;

/// Documents of one search split by what happens to them next
#[derive(Debug, Default)]
pub struct Candidates {
    /// To be signed automatically
    pub to_sign: Vec<Document>,
    /// Excluded by type, waiting for a human
    pub manual: Vec<Document>,
}

/// Log on to the portal. An explicit rejection is fatal.
pub async fn login(
    portal: &dyn Portal,
    settings: &Settings,
    cancel: &CancellationToken,
) -> SignerResult<()> {
    info!("Logging in as {}", settings.login);

    check_cancelled(cancel)?;
    let reply = until_cancelled(
        cancel,
        portal.authenticate(&settings.login, &settings.password),
    )
    .await?;
    if !reply.success {
        return Err(SignerError::BreakWork(format!(
            "Login rejected: {}",
            reply.message("no reason given")
        )));
    }

    info!("Logged in");
    Ok(())
}

/// Collect every page of the search until the portal returns an empty one
pub async fn search_documents(
    portal: &dyn Portal,
    range: &DateRange,
    cancel: &CancellationToken,
) -> SignerResult<Vec<Document>> {
    let mut documents = Vec::new();
    let mut start = 0;

    for page in 1..=MAX_PAGES {
        check_cancelled(cancel)?;

        let batch = until_cancelled(
            cancel,
            portal.search_documents(range, start, page, PAGE_SIZE),
        )
        .await?;
        if batch.is_empty() {
            debug!("Search finished after {} page(s)", page - 1);
            return Ok(documents);
        }

        start += PAGE_SIZE;
        documents.extend(batch);
    }

    warn!("Search stopped after {} pages", MAX_PAGES);
    Ok(documents)
}

/// Log documents the portal already flagged with an error.
/// Returns how many were found.
pub fn log_documents_with_errors(documents: &[Document]) -> usize {
    let mut count = 0;
    for doc in documents.iter().filter(|doc| doc.requires_signature()) {
        if let Some(msg) = doc.remote_error() {
            warn!("{} has a portal error: {}", doc, msg);
            count += 1;
        }
    }
    count
}

/// Keep documents that need a signature, have no portal error, are not of
/// an excluded type and are not in the failure cache.
pub fn select_candidates(
    documents: Vec<Document>,
    settings: &Settings,
    cache: &mut TtlCache,
) -> Candidates {
    let mut candidates = Candidates::default();

    for doc in documents {
        if !doc.requires_signature() || doc.remote_error().is_some() {
            continue;
        }
        if settings.is_ignored_doc_type(&doc.doc_type) {
            warn!("{} ({}) must be signed manually", doc, doc.doc_type);
            candidates.manual.push(doc);
            continue;
        }
        if cache.contains(&doc.id) {
            debug!("{} failed recently, skipping", doc);
            continue;
        }
        candidates.to_sign.push(doc);
    }

    candidates
}

/// Pair portal certificates with local credentials that can actually sign
///
/// Fails with `BreakWork` when the portal has no certificates, none of
/// them is installed locally, or none of the installed ones passes a test
/// signature.
pub async fn fetch_certificates(
    portal: &dyn Portal,
    store: &Arc<dyn CredentialStore>,
    cancel: &CancellationToken,
) -> SignerResult<Vec<CertificateBinding>> {
    check_cancelled(cancel)?;
    let remote = until_cancelled(cancel, portal.list_certificates()).await?;
    if remote.is_empty() {
        return Err(SignerError::BreakWork(
            "No certificates registered on the portal for this user".to_string(),
        ));
    }

    let store = Arc::clone(store);
    let usable = tokio::task::spawn_blocking(move || -> SignerResult<Vec<CertificateBinding>> {
        let local = store.list_local_credentials()?;

        let matched: Vec<CertificateBinding> = remote
            .into_iter()
            .filter_map(|remote| {
                let thumbprint = normalize_thumbprint(&remote.sha1);
                local.get(&thumbprint).map(|local| CertificateBinding {
                    remote,
                    local: local.clone(),
                })
            })
            .collect();
        if matched.is_empty() {
            return Err(SignerError::BreakWork(
                "None of the portal certificates is installed locally".to_string(),
            ));
        }

        Ok(matched
            .into_iter()
            .filter(|binding| match store.sign(&binding.local, TEST_PAYLOAD) {
                Ok(_) => true,
                Err(e) => {
                    warn!(
                        "Certificate {} failed the test signature: {}",
                        binding.local.subject_name, e
                    );
                    false
                }
            })
            .collect())
    })
    .await
    .map_err(|e| SignerError::Internal(format!("Certificate check failed: {}", e)))??;

    if usable.is_empty() {
        return Err(SignerError::BreakWork(
            "No installed certificate is able to sign".to_string(),
        ));
    }

    for binding in &usable {
        debug!(
            "Certificate {} ({}) ready",
            binding.local.subject_name, binding.remote.id
        );
    }
    Ok(usable)
}
