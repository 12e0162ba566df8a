/// Remote portal access
///
/// The signing engine only sees the `Portal` trait; `PortalClient` is the
/// HTTP implementation talking to the EMD registry endpoints.
pub mod client;
pub mod models;

pub use client::PortalClient;
pub use models::*;

use crate::{dates::DateRange, error::SignerResult};
use async_trait::async_trait;

/// Operations the signer consumes from the remote portal
///
/// Every method except `authenticate` reports a dropped session as
/// `SignerError::SessionExpired`.
#[async_trait]
pub trait Portal: Send + Sync {
    /// Log on with user credentials
    async fn authenticate(&self, login: &str, password: &str) -> SignerResult<StatusReply>;

    /// Fetch one page of documents waiting for the organisation's signature
    async fn search_documents(
        &self,
        range: &DateRange,
        start: usize,
        page: usize,
        limit: usize,
    ) -> SignerResult<Vec<Document>>;

    /// Certificates registered for the current user
    async fn list_certificates(&self) -> SignerResult<Vec<RemoteCertificate>>;

    /// Ask whether the document can still be signed with this certificate
    async fn check_eligibility(
        &self,
        doc: &Document,
        certificate_id: &str,
    ) -> SignerResult<StatusReply>;

    /// Fetch the content to sign and its hash
    async fn fetch_sign_payload(
        &self,
        doc: &Document,
        certificate_id: &str,
    ) -> SignerResult<SignPayloadReply>;

    /// Store a detached signature for the document version
    async fn submit_signature(
        &self,
        doc: &Document,
        hash_base64: &str,
        signature_base64: &str,
        certificate_id: &str,
    ) -> SignerResult<SubmitReply>;
}
