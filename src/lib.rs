/// EMD Signer - unattended signing of EMD registry documents
///
/// Polls the regional EMD portal for documents waiting for the
/// organisation's signature, signs them with locally installed credentials
/// and uploads the signatures back.

pub mod alert;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod dates;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod portal;
pub mod signing;

#[cfg(test)]
mod testutil;

pub use error::{SignerError, SignerResult};
