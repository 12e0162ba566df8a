/// HTTP client for the EMD portal
///
/// The portal is an ExtJS-style application: every call is a form-encoded
/// POST to `?c=<controller>&m=<method>` with a `Referer` header, and the
/// session lives in cookies. When the session is gone the portal answers
/// with its HTML logon page instead of JSON, so a body that does not decode
/// is reported as `SessionExpired`.
use crate::{
    dates::DateRange,
    error::{SignerError, SignerResult},
    portal::{
        Document, Portal, RemoteCertificate, SignPayloadReply, StatusReply, SubmitReply,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const PROMED_REFERER: &str = "?c=promed";
const LOGON_REFERER: &str = "?c=portal&m=udp";

/// Portal client sharing one cookie-backed session between all workers
#[derive(Clone)]
pub struct PortalClient {
    base_url: String,
    http_client: Client,
}

impl PortalClient {
    /// Create a new portal client
    pub fn new(base_url: &str, timeout: Duration) -> SignerResult<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("emd-signer/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| SignerError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST a form and return the raw body
    async fn post(&self, path: &str, form: &[(&str, String)], referer: &str) -> SignerResult<String> {
        let url = self.url(path);
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(&url)
            .header(header::REFERER, self.url(referer))
            .form(form)
            .send()
            .await
            .map_err(|e| SignerError::Network(format!("POST {}: {}", path, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SignerError::Network(format!("POST {}: {}", path, e)))?;

        debug!("POST {} -> {} ({} bytes)", path, status, body.len());
        Ok(body)
    }

    /// POST a form and decode the JSON reply; an undecodable reply means
    /// the portal served something other than API data, i.e. the session
    /// was dropped.
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> SignerResult<T> {
        let body = self.post(path, form, PROMED_REFERER).await?;
        serde_json::from_str(&body).map_err(|e| {
            SignerError::SessionExpired(format!("{}: unexpected reply: {}", method_of(path), e))
        })
    }
}

/// Cache-buster parameter the web UI appends to list calls
fn cache_buster() -> i64 {
    Utc::now().timestamp_millis()
}

fn method_of(path: &str) -> &str {
    path.split('&')
        .find_map(|part| part.strip_prefix("m="))
        .unwrap_or(path)
}

#[async_trait]
impl Portal for PortalClient {
    async fn authenticate(&self, login: &str, password: &str) -> SignerResult<StatusReply> {
        let path = format!(
            "?c=main&m=index&method=Logon&login={}",
            urlencoding::encode(login)
        );
        let form = [
            ("login", login.to_string()),
            ("psw", password.to_string()),
            ("swUserRegion", String::new()),
            ("swUserDBType", String::new()),
        ];

        let body = self.post(&path, &form, LOGON_REFERER).await?;
        serde_json::from_str(&body)
            .map_err(|e| SignerError::Portal(format!("Logon: unexpected reply: {}", e)))
    }

    async fn search_documents(
        &self,
        range: &DateRange,
        start: usize,
        page: usize,
        limit: usize,
    ) -> SignerResult<Vec<Document>> {
        let path = format!(
            "?c=EMD&m=loadEMDSignBundleWindow&_dc={}",
            cache_buster()
        );
        let form = [
            ("LpuBuilding_id", "null".to_string()),
            ("EMDRegistry_EMDDate_period", range.period()),
            ("EMDVersion_RegistrationDate_period", String::new()),
            ("EMDRegistry_Num", String::new()),
            ("Person_FIO", String::new()),
            ("EMDDocumentType_Code", "null".to_string()),
            ("EMDVersionStatus", String::new()),
            ("ReceptType_id", String::new()),
            ("isLpuSignNeeded", "on".to_string()),
            ("page", page.to_string()),
            ("limit", limit.to_string()),
            ("isMOSign", "true".to_string()),
            ("start", start.to_string()),
        ];

        self.post_json(&path, &form).await
    }

    async fn list_certificates(&self) -> SignerResult<Vec<RemoteCertificate>> {
        let path = format!(
            "?c=EMD&m=loadEMDCertificateList&_dc={}",
            cache_buster()
        );
        let form = [
            ("excludeExpire", "true".to_string()),
            ("excludeIsNotUse", "true".to_string()),
            ("isMOSign", "1".to_string()),
            ("page", "1".to_string()),
            ("start", "0".to_string()),
            ("limit", "25".to_string()),
        ];

        self.post_json(&path, &form).await
    }

    async fn check_eligibility(
        &self,
        doc: &Document,
        certificate_id: &str,
    ) -> SignerResult<StatusReply> {
        let form = [
            ("EMDRegistry_ObjectName", doc.doc_type.clone()),
            ("EMDRegistry_ObjectID", doc.id.clone()),
            ("EMDCertificate_id", certificate_id.to_string()),
            ("EMDVersion_id", doc.version_id.clone()),
            ("isMOSign", "true".to_string()),
            ("isPreview", String::new()),
        ];

        self.post_json("?c=EMD&m=checkBeforeSign", &form).await
    }

    async fn fetch_sign_payload(
        &self,
        doc: &Document,
        certificate_id: &str,
    ) -> SignerResult<SignPayloadReply> {
        let form = [
            ("EMDRegistry_ObjectName", doc.doc_type.clone()),
            ("EMDRegistry_ObjectID", doc.id.clone()),
            ("isMOSign", "true".to_string()),
            ("EMDCertificate_id", certificate_id.to_string()),
            ("isPreview", String::new()),
            ("EMDVersion_VersionNum", doc.version_num.to_string()),
        ];

        self.post_json("?c=EMD&m=getEMDVersionSignData", &form).await
    }

    async fn submit_signature(
        &self,
        doc: &Document,
        hash_base64: &str,
        signature_base64: &str,
        certificate_id: &str,
    ) -> SignerResult<SubmitReply> {
        let form = [
            ("EMDRegistry_ObjectName", doc.doc_type.clone()),
            ("EMDRegistry_ObjectID", doc.id.clone()),
            ("EMDVersion_id", doc.version_id.clone()),
            ("Signatures_Hash", hash_base64.to_string()),
            ("Signatures_SignedData", signature_base64.to_string()),
            ("EMDCertificate_id", certificate_id.to_string()),
            ("signType", "cryptopro".to_string()),
            ("isMOSign", "true".to_string()),
            ("LpuSection_id", String::new()),
            ("MedService_id", String::new()),
        ];

        self.post_json("?c=EMD&m=saveEMDSignatures", &form).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = PortalClient::new("https://portal.example.org/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("?c=EMD&m=checkBeforeSign"),
            "https://portal.example.org/?c=EMD&m=checkBeforeSign"
        );
    }

    #[test]
    fn test_method_of() {
        assert_eq!(method_of("?c=EMD&m=saveEMDSignatures"), "saveEMDSignatures");
        assert_eq!(
            method_of("?c=EMD&m=loadEMDCertificateList&_dc=1"),
            "loadEMDCertificateList"
        );
        assert_eq!(method_of("plain"), "plain");
    }
}
