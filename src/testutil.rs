/// In-memory doubles for the portal, the credential store and the alert

use crate::{
    alert::AlertSink,
    crypto::{normalize_thumbprint, CredentialStore, LocalCredential},
    dates::DateRange,
    error::{SignerError, SignerResult},
    portal::{
        Document, Portal, RemoteCertificate, SignPayload, SignPayloadReply, StatusReply,
        SubmitReply, SIGNATURE_REQUIRED,
    },
    signing::{CertificateBinding, SigningContext},
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Portal call that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Check,
    Fetch,
    Submit,
}

/// How a scripted call fails
#[derive(Debug, Clone)]
pub enum StageFailure {
    /// `success: false` with this message
    Rejected(String),
    /// Successful reply without items (payload stage only)
    Empty,
    /// Undecodable reply
    SessionLost,
    /// Transport error
    Network,
}

/// Scriptable in-memory portal
#[derive(Default)]
pub struct FakePortal {
    login_rejected: bool,
    login_hangs: bool,
    pages: Vec<Vec<Document>>,
    certificates: Vec<RemoteCertificate>,
    failures: HashMap<(Stage, String), StageFailure>,
    cancel_on_check: Option<(String, CancellationToken)>,
    logins: AtomicUsize,
    calls: Mutex<Vec<(Stage, String)>>,
}

impl FakePortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_login(mut self) -> Self {
        self.login_rejected = true;
        self
    }

    /// Logon that never answers
    pub fn hang_login(mut self) -> Self {
        self.login_hangs = true;
        self
    }

    /// Documents returned by the search, one page per call
    pub fn with_page(mut self, docs: Vec<Document>) -> Self {
        self.pages.push(docs);
        self
    }

    pub fn with_certificate(mut self, id: &str, sha1: &str) -> Self {
        self.certificates.push(RemoteCertificate {
            id: id.to_string(),
            sha1: sha1.to_string(),
        });
        self
    }

    pub fn fail(mut self, stage: Stage, doc_id: &str, failure: StageFailure) -> Self {
        self.failures.insert((stage, doc_id.to_string()), failure);
        self
    }

    /// Cancel `token` while the eligibility check of `doc_id` is in flight
    pub fn cancel_on_check(mut self, doc_id: &str, token: CancellationToken) -> Self {
        self.cancel_on_check = Some((doc_id.to_string(), token));
        self
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, doc_id: &str) -> Vec<Stage> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, id)| id == doc_id)
            .map(|(stage, _)| *stage)
            .collect()
    }

    /// Ids of documents whose signature was stored, in call order
    pub fn submitted(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(stage, id)| {
                *stage == Stage::Submit && !self.failures.contains_key(&(Stage::Submit, id.clone()))
            })
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn record(&self, stage: Stage, doc: &Document) -> Option<StageFailure> {
        self.calls.lock().unwrap().push((stage, doc.id.clone()));
        self.failures.get(&(stage, doc.id.clone())).cloned()
    }
}

fn failed_status(failure: StageFailure) -> SignerResult<StatusReply> {
    match failure {
        StageFailure::Rejected(msg) => Ok(StatusReply {
            success: false,
            error_msg: Some(msg),
        }),
        StageFailure::Empty => Ok(StatusReply {
            success: true,
            error_msg: None,
        }),
        StageFailure::SessionLost => Err(SignerError::SessionExpired("logon page".to_string())),
        StageFailure::Network => Err(SignerError::Network("connection reset".to_string())),
    }
}

#[async_trait]
impl Portal for FakePortal {
    async fn authenticate(&self, _login: &str, _password: &str) -> SignerResult<StatusReply> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.login_hangs {
            std::future::pending::<()>().await;
        }
        if self.login_rejected {
            Ok(StatusReply {
                success: false,
                error_msg: Some("Wrong login or password".to_string()),
            })
        } else {
            Ok(StatusReply {
                success: true,
                error_msg: None,
            })
        }
    }

    async fn search_documents(
        &self,
        _range: &DateRange,
        _start: usize,
        page: usize,
        _limit: usize,
    ) -> SignerResult<Vec<Document>> {
        Ok(self.pages.get(page - 1).cloned().unwrap_or_default())
    }

    async fn list_certificates(&self) -> SignerResult<Vec<RemoteCertificate>> {
        Ok(self.certificates.clone())
    }

    async fn check_eligibility(
        &self,
        doc: &Document,
        _certificate_id: &str,
    ) -> SignerResult<StatusReply> {
        let failure = self.record(Stage::Check, doc);
        if let Some((id, token)) = &self.cancel_on_check {
            if *id == doc.id {
                token.cancel();
            }
        }
        match failure {
            Some(failure) => failed_status(failure),
            None => Ok(StatusReply {
                success: true,
                error_msg: None,
            }),
        }
    }

    async fn fetch_sign_payload(
        &self,
        doc: &Document,
        _certificate_id: &str,
    ) -> SignerResult<SignPayloadReply> {
        let to_sign = vec![SignPayload {
            doc_base64: format!("content-{}", doc.id),
            hash_base64: format!("hash-{}", doc.id),
            ..Default::default()
        }];
        match self.record(Stage::Fetch, doc) {
            None => Ok(SignPayloadReply {
                success: true,
                error_msg: None,
                to_sign,
            }),
            Some(StageFailure::Empty) => Ok(SignPayloadReply {
                success: true,
                error_msg: None,
                to_sign: Vec::new(),
            }),
            Some(failure) => failed_status(failure).map(|status| SignPayloadReply {
                success: status.success,
                error_msg: status.error_msg,
                to_sign: Vec::new(),
            }),
        }
    }

    async fn submit_signature(
        &self,
        doc: &Document,
        _hash_base64: &str,
        _signature_base64: &str,
        _certificate_id: &str,
    ) -> SignerResult<SubmitReply> {
        match self.record(Stage::Submit, doc) {
            None => Ok(SubmitReply {
                success: true,
                error_msg: None,
                signature_id: format!("sig-{}", doc.id),
            }),
            Some(failure) => failed_status(failure).map(|status| SubmitReply {
                success: status.success,
                error_msg: status.error_msg,
                signature_id: String::new(),
            }),
        }
    }
}

/// In-memory credential store
#[derive(Default)]
pub struct FakeStore {
    credentials: HashMap<String, LocalCredential>,
    broken: HashSet<String>,
    refused_payloads: HashSet<String>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding one credential valid for 30 days
    pub fn with_valid(thumbprint: &str) -> Self {
        Self::new().with_credential(thumbprint, 30)
    }

    pub fn with_credential(mut self, thumbprint: &str, valid_days: i64) -> Self {
        let credential = local_credential(thumbprint, valid_days);
        self.credentials
            .insert(credential.thumbprint.clone(), credential);
        self
    }

    /// Credential that is listed but cannot sign anything
    pub fn broken(mut self, thumbprint: &str) -> Self {
        self.broken.insert(normalize_thumbprint(thumbprint));
        self
    }

    pub fn refuse_payload(mut self, payload: &str) -> Self {
        self.refused_payloads.insert(payload.to_string());
        self
    }
}

impl CredentialStore for FakeStore {
    fn list_local_credentials(&self) -> SignerResult<HashMap<String, LocalCredential>> {
        Ok(self.credentials.clone())
    }

    fn sign(&self, credential: &LocalCredential, payload_base64: &str) -> SignerResult<String> {
        if self.broken.contains(&credential.thumbprint) {
            return Err(SignerError::Crypto("provider rejected the key".to_string()));
        }
        if self.refused_payloads.contains(payload_base64) {
            return Err(SignerError::Crypto("provider rejected the payload".to_string()));
        }
        Ok(format!("signed:{}:{}", credential.thumbprint, payload_base64))
    }
}

/// Alert that remembers every call
#[derive(Default)]
pub struct RecordingAlert {
    events: Mutex<Vec<bool>>,
}

impl RecordingAlert {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` for raise, `false` for clear, in call order
    pub fn events(&self) -> Vec<bool> {
        self.events.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlert {
    fn raise(&self, _pending: usize) {
        self.events.lock().unwrap().push(true);
    }

    fn clear(&self) {
        self.events.lock().unwrap().push(false);
    }
}

/// Document that requires a signature and has no remote error
pub fn document(id: &str, doc_type: &str) -> Document {
    Document {
        id: id.to_string(),
        doc_type: doc_type.to_string(),
        name: format!("Document {}", id),
        num: id.to_string(),
        version_id: format!("v{}", id),
        version_num: 1,
        signed_state: SIGNATURE_REQUIRED.to_string(),
        error_msg: None,
    }
}

pub fn local_credential(thumbprint: &str, valid_days: i64) -> LocalCredential {
    let thumbprint = normalize_thumbprint(thumbprint);
    LocalCredential {
        subject_name: format!("CN={}", thumbprint),
        thumbprint,
        valid_to: Utc::now() + ChronoDuration::days(valid_days),
    }
}

/// Binding whose remote id equals the thumbprint
pub fn binding(thumbprint: &str, valid_days: i64) -> CertificateBinding {
    CertificateBinding {
        remote: RemoteCertificate {
            id: thumbprint.to_string(),
            sha1: thumbprint.to_string(),
        },
        local: local_credential(thumbprint, valid_days),
    }
}

pub fn signing_context(
    portal: Arc<dyn Portal>,
    store: Arc<dyn CredentialStore>,
) -> SigningContext {
    SigningContext {
        portal,
        store,
        cancel: CancellationToken::new(),
        safety_margin: Duration::from_millis(600),
        pacing: Duration::ZERO,
    }
}
