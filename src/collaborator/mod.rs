//! Boundary to the external cryptographic collaborator (certificate
//! generation, PDF signing, signature verification). The collaborator is a
//! black box: a subprocess that takes base64 payloads and emits one JSON
//! object on stdout. Everything here is orchestration; no cryptography.

pub mod fake;
pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use fake::FakeCollaborator;
pub use process::ProcessCollaborator;

#[derive(thiserror::Error, Debug)]
pub enum CollaboratorError {
    #[error("failed to spawn collaborator process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("collaborator exited with {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("collaborator produced malformed output: {0}")]
    MalformedOutput(String),
    #[error("collaborator reported: {0}")]
    Reported(String),
}

/// Request to mint a signing credential for a user.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub user_name: String,
    pub email: String,
    pub country: String,
    pub organization: String,
    pub organizational_unit: String,
    pub days_valid: i64,
}

/// Decoded collaborator response for certificate generation.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate_pem: Vec<u8>,
    pub private_key_pem: Vec<u8>,
    pub info: Option<CertificateInfo>,
}

/// Identifying attributes as reported by the collaborator. Kept as wire
/// strings; callers parse dates/serials as needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateInfo {
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub organizational_unit_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_serial")]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_to: Option<String>,
    #[serde(default)]
    pub issuer_common_name: Option<String>,
    #[serde(default)]
    pub fingerprint_sha256: Option<String>,
}

// Serial numbers arrive as either JSON numbers or strings.
fn deserialize_serial<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}

#[derive(Debug, Clone)]
pub struct SignPdfRequest {
    pub pdf: Vec<u8>,
    pub certificate_pem: Vec<u8>,
    pub private_key_pem: Vec<u8>,
    pub signer_name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SignedPdf {
    pub pdf: Vec<u8>,
    pub signature_hash: String,
}

/// One embedded signature as reported by the verify action. Identity comes
/// from the signed artifact's certificate, not from request context. The
/// three booleans are independent so callers can tell forgery from
/// post-signing modification from an untrusted issuer.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SignatureReport {
    #[serde(default)]
    pub signer_name: Option<String>,
    #[serde(default)]
    pub signer_email: Option<String>,
    #[serde(default)]
    pub signing_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub intact: bool,
    #[serde(default)]
    pub trusted: bool,
}

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn generate(&self, request: &IssueRequest) -> Result<IssuedCertificate, CollaboratorError>;
}

#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign_pdf(&self, request: &SignPdfRequest) -> Result<SignedPdf, CollaboratorError>;
    async fn verify_pdf(&self, pdf: &[u8]) -> Result<Vec<SignatureReport>, CollaboratorError>;
}
