/// Per-document signing pipeline
///
/// Each document goes through four stages, in order and without retries:
/// eligibility check, payload fetch, signature, submission. Cancellation is
/// checked before every stage and raced against every portal call.
use crate::{
    error::{SignerError, SignerResult},
    portal::Document,
    signing::{
        check_cancelled, select_certificate, sleep_cancellable, until_cancelled,
        CertificateBinding, SigningContext, SigningResult,
    },
};
use chrono::Utc;
use tracing::{debug, error, warn};

/// Sign one document, returning the portal's signature id.
///
/// Recoverable portal or signer refusals come back as
/// `SignerError::Warning`; a dropped session as `SessionExpired`.
pub async fn sign_document(
    ctx: &SigningContext,
    worker: usize,
    doc: &Document,
    bindings: &[CertificateBinding],
) -> SignerResult<String> {
    check_cancelled(&ctx.cancel)?;

    let binding = select_certificate(bindings, Some(worker), ctx.safety_margin, Utc::now())?;
    let certificate_id = binding.remote.id.as_str();
    debug!(
        "[{}] certificate selected: {} valid to {}",
        worker,
        binding.local.subject_name,
        binding.local.valid_to.format("%d.%m.%Y %H:%M:%S")
    );

    // Stage 1: eligibility
    check_cancelled(&ctx.cancel)?;
    let reply = until_cancelled(&ctx.cancel, ctx.portal.check_eligibility(doc, certificate_id)).await?;
    if !reply.success {
        return Err(SignerError::Warning(reply.message("checkBeforeSign failed")));
    }
    debug!("[{}] {} eligibility check passed", worker, doc);

    // Stage 2: payload
    check_cancelled(&ctx.cancel)?;
    let reply =
        until_cancelled(&ctx.cancel, ctx.portal.fetch_sign_payload(doc, certificate_id)).await?;
    if !reply.success {
        return Err(SignerError::Warning(reply.message("getEMDVersionSignData failed")));
    }
    let payload = reply.to_sign.into_iter().next().ok_or_else(|| {
        SignerError::Warning("getEMDVersionSignData: nothing to sign".to_string())
    })?;
    debug!("[{}] {} payload received", worker, doc);

    // Stage 3: signature
    check_cancelled(&ctx.cancel)?;
    let store = ctx.store.clone();
    let credential = binding.local.clone();
    let content = payload.doc_base64;
    let signature = tokio::task::spawn_blocking(move || store.sign(&credential, &content))
        .await
        .map_err(|e| SignerError::Internal(format!("Signing task failed: {}", e)))?
        .map_err(|e| SignerError::Warning(format!("Sign: {}", e)))?;
    debug!("[{}] {} signature created", worker, doc);

    // Stage 4: submission
    check_cancelled(&ctx.cancel)?;
    let reply = until_cancelled(
        &ctx.cancel,
        ctx.portal
            .submit_signature(doc, &payload.hash_base64, &signature, certificate_id),
    )
    .await?;
    if !reply.success {
        return Err(SignerError::Warning(reply.message("saveEMDSignatures failed")));
    }
    debug!("[{}] {} signature stored on the portal", worker, doc);

    Ok(reply.signature_id)
}

/// Sign one worker's partition in order.
///
/// Warnings are collected and the worker moves on. `SessionExpired` and
/// `StopRequested` abort immediately. Anything else stops this partition
/// only: it is logged and the partial result is returned.
pub async fn run_partition(
    ctx: &SigningContext,
    worker: usize,
    docs: Vec<Document>,
    bindings: &[CertificateBinding],
) -> SignerResult<SigningResult> {
    let mut result = SigningResult::default();

    for doc in docs {
        match sign_document(ctx, worker, &doc, bindings).await {
            Ok(signature_id) => {
                debug!("[{}] {} signed (signature {})", worker, doc, signature_id);
                result.signed += 1;
            }
            Err(SignerError::Warning(msg)) => {
                warn!("[{}] {}: {}", worker, doc, msg);
                result.failed.push(doc.id.clone());
            }
            Err(e) if e.is_escalating() => return Err(e),
            Err(e) => {
                error!("[{}] {}: {}", worker, doc, e);
                break;
            }
        }

        sleep_cancellable(&ctx.cancel, ctx.pacing).await?;
    }

    Ok(result)
}
