use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

use super::user::parse_id;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentSignature {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub certificate_id: Option<Uuid>,
    pub reason: String,
    pub signature_hash: String,
    pub signed_at: DateTime<Utc>,
}

impl crate::events::Loggable for DocumentSignature {
    fn entity_type() -> &'static str { "document_signature" }
    fn subject_id(&self) -> Uuid { self.document_id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDocumentSignature {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub certificate_id: Option<String>,
    pub reason: String,
    pub signature_hash: String,
    pub signed_at: DateTime<Utc>,
}

impl TryFrom<DbDocumentSignature> for DocumentSignature {
    type Error = AppError;

    fn try_from(value: DbDocumentSignature) -> Result<Self, Self::Error> {
        Ok(DocumentSignature {
            id: parse_id(&value.id)?,
            document_id: parse_id(&value.document_id)?,
            user_id: parse_id(&value.user_id)?,
            certificate_id: value.certificate_id.as_deref().map(parse_id).transpose()?,
            reason: value.reason,
            signature_hash: value.signature_hash,
            signed_at: value.signed_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignRequest {
    #[schema(example = "Approved for publication")]
    pub reason: Option<String>,
    /// Optional credential to sign with; must belong to the caller and be
    /// active.
    pub certificate_id: Option<Uuid>,
}

/// Response for a recorded signature plus the document's resulting state.
#[derive(Debug, Serialize, ToSchema)]
pub struct SignResponse {
    pub signature_id: Uuid,
    pub signature_hash: String,
    pub document_status: super::document::DocumentStatus,
    pub signatures_completed: i64,
    pub signatures_required: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignWithCertificateRequest {
    /// Base64 of the PDF to embed the signature into.
    pub pdf_base64: String,
    pub certificate_id: Uuid,
    #[schema(example = "Approved for publication")]
    pub reason: Option<String>,
    /// Document the signature is recorded against.
    pub document_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// Base64 of the PDF whose embedded signatures should be checked.
    pub pdf_base64: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub signatures: Vec<crate::collaborator::SignatureReport>,
    /// True only when every embedded signature is valid, intact and trusted.
    pub fully_valid: bool,
}
