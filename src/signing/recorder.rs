//! Records signatures. Eligibility is checked in order (document exists,
//! sign permission, certificate ownership) but the duplicate-signature
//! check is left to the UNIQUE(document_id, user_id) constraint, so two
//! concurrent attempts by the same user resolve to exactly one row.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::{self, ActorContext, DocumentContext, PermissionType};
use crate::errors::{AppError, AppResult};
use crate::models::{DbDocument, DbDocumentSignature, Document, DocumentSignature};
use crate::utils;

const DEFAULT_REASON: &str = "Signed electronically";

pub struct RecordedSignature {
    pub signature: DocumentSignature,
    pub document: Document,
}

/// Record `actor`'s signature on `document_id`, then recompute the document
/// status from a fresh count. `certificate_id`, when supplied, must already
/// be validated as owned-and-active by the caller. `hash_override` carries
/// the collaborator's hash on the embedded-signature path; the plain path
/// derives the audit hash from the signing facts.
pub async fn record_signature(
    pool: &SqlitePool,
    actor: &ActorContext,
    document_id: Uuid,
    certificate_id: Option<Uuid>,
    reason: Option<String>,
    hash_override: Option<String>,
) -> AppResult<RecordedSignature> {
    let document = load_document(pool, document_id).await?;

    let context = DocumentContext {
        id: document.id,
        owner_id: document.owner_id,
        owner_department: owner_department(pool, document.owner_id).await?,
    };
    if !authz::can_access(pool, actor, &context, PermissionType::Sign).await? {
        return Err(AppError::forbidden("no sign permission on this document"));
    }

    let reason = reason.unwrap_or_else(|| DEFAULT_REASON.to_string());
    let signature_id = Uuid::new_v4();
    let signed_at = utils::utc_now();
    let hash = hash_override
        .unwrap_or_else(|| utils::signature_hash(document_id, actor.id, signed_at, &reason));

    let insert = sqlx::query(
        r#"
        INSERT INTO document_signatures (id, document_id, user_id, certificate_id, reason, signature_hash, signed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(signature_id.to_string())
    .bind(document_id.to_string())
    .bind(actor.id.to_string())
    .bind(certificate_id.map(|id| id.to_string()))
    .bind(&reason)
    .bind(&hash)
    .bind(signed_at)
    .execute(pool)
    .await;

    if let Err(err) = insert {
        if AppError::is_unique_violation(&err) {
            return Err(AppError::AlreadySigned);
        }
        return Err(err.into());
    }

    let document = super::recompute_status(pool, document_id).await?;

    let signature = DocumentSignature {
        id: signature_id,
        document_id,
        user_id: actor.id,
        certificate_id,
        reason,
        signature_hash: hash,
        signed_at,
    };

    Ok(RecordedSignature { signature, document })
}

/// Advisory pre-read so callers can report a duplicate before doing other
/// validation work. The UNIQUE constraint remains the arbiter on insert.
pub async fn has_signature(pool: &SqlitePool, document_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM document_signatures WHERE document_id = ? AND user_id = ?",
    )
    .bind(document_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

pub async fn list_signatures(pool: &SqlitePool, document_id: Uuid) -> AppResult<Vec<DocumentSignature>> {
    let rows: Vec<DbDocumentSignature> = sqlx::query_as(
        "SELECT * FROM document_signatures WHERE document_id = ? ORDER BY signed_at ASC",
    )
    .bind(document_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DocumentSignature::try_from).collect()
}

async fn load_document(pool: &SqlitePool, document_id: Uuid) -> AppResult<Document> {
    let row: Option<DbDocument> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
        .bind(document_id.to_string())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Document::try_from(row),
        None => Err(AppError::not_found(format!("document {document_id}"))),
    }
}

async fn owner_department(pool: &SqlitePool, owner_id: Uuid) -> AppResult<Option<String>> {
    let department: Option<Option<String>> =
        sqlx::query_scalar("SELECT department FROM users WHERE id = ?")
            .bind(owner_id.to_string())
            .fetch_optional(pool)
            .await?;
    Ok(department.flatten())
}
