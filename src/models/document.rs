use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

use super::user::parse_id;

/// Workflow states a document moves through. Transitions only move forward:
/// a document never leaves `Signed`, and `InReview` never falls back to
/// `Pending` even if a recount comes up short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    InReview,
    Signed,
    Rejected,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::InReview => "in_review",
            DocumentStatus::Signed => "signed",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "in_review" => Ok(DocumentStatus::InReview),
            "signed" => Ok(DocumentStatus::Signed),
            "rejected" => Ok(DocumentStatus::Rejected),
            "archived" => Ok(DocumentStatus::Archived),
            other => Err(AppError::internal(format!("unknown document status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub storage_path: String,
    pub status: DocumentStatus,
    pub requires_signatures: i64,
    pub signature_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Document {
    fn entity_type() -> &'static str { "document" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub storage_path: String,
    pub status: String,
    pub requires_signatures: i64,
    pub signature_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbDocument> for Document {
    type Error = AppError;

    fn try_from(value: DbDocument) -> Result<Self, Self::Error> {
        Ok(Document {
            id: parse_id(&value.id)?,
            owner_id: parse_id(&value.owner_id)?,
            title: value.title,
            storage_path: value.storage_path,
            status: value.status.parse()?,
            requires_signatures: value.requires_signatures,
            signature_count: value.signature_count,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentCreateRequest {
    #[schema(example = "Donation agreement Q3")]
    pub title: String,
    /// Logical storage key of the uploaded file.
    #[schema(example = "u-123/documents/agreement.pdf")]
    pub storage_path: String,
    /// How many distinct signers this document needs before it is `signed`.
    #[schema(example = 2)]
    pub requires_signatures: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DocumentStatusRequest {
    #[schema(example = "rejected")]
    pub status: DocumentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentStatusResponse {
    pub id: Uuid,
    pub status: DocumentStatus,
    pub signature_count: i64,
    pub requires_signatures: i64,
}
