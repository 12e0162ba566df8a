/// Unified error types for the EMD signer
///
/// Every layer (portal client, signing pipeline, dispatcher, orchestration
/// loop) reports failures through `SignerError`. The variant decides how far
/// the failure travels:
///
/// - `Warning` stays with the document that caused it
/// - `SessionExpired` ends the current dispatch and forces a new logon
/// - `StopRequested` unwinds everything and ends the loop cleanly
/// - `BreakWork` ends the process
/// - everything else aborts the current worker partition or cycle
use thiserror::Error;

/// Main error type for the signer
#[derive(Error, Debug)]
pub enum SignerError {
    /// Per-document recoverable failure reported by the portal or the signer
    #[error("{0}")]
    Warning(String),

    /// The portal session was dropped server-side
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Cancellation was requested
    #[error("Stop requested")]
    StopRequested,

    /// Fatal condition, no progress is possible for the rest of the run
    #[error("{0}")]
    BreakWork(String),

    /// No certificate binding is valid for long enough to sign with
    #[error("No suitable certificate found")]
    NoSuitableCredential,

    /// Transport errors talking to the portal
    #[error("Network error: {0}")]
    Network(String),

    /// Portal replied with something we could not use
    #[error("Portal error: {0}")]
    Portal(String),

    /// Credential store or signing provider errors
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignerError {
    /// Conditions that are process-wide rather than local to one document
    /// or partition. These outrank every other outcome of a batch.
    pub fn is_escalating(&self) -> bool {
        matches!(
            self,
            SignerError::SessionExpired(_) | SignerError::StopRequested
        )
    }

    /// Whether this failure only concerns the document being processed
    pub fn is_warning(&self) -> bool {
        matches!(self, SignerError::Warning(_))
    }

    /// Whether the run cannot continue at all
    pub fn is_fatal(&self) -> bool {
        matches!(self, SignerError::BreakWork(_))
    }
}

impl From<reqwest::Error> for SignerError {
    fn from(e: reqwest::Error) -> Self {
        SignerError::Network(e.to_string())
    }
}

/// Result type alias for signer operations
pub type SignerResult<T> = Result<T, SignerError>;
