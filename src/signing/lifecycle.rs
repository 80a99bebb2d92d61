//! Document status transitions driven by signature counts. Purely reactive:
//! every recomputation starts from a fresh count and is idempotent, so
//! racing calls converge on the same state.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{DbDocument, Document, DocumentStatus};

/// Recount signatures for `document_id` and move the document forward if the
/// count warrants it. The denormalized `signature_count` column is always
/// overwritten from the fresh count; drift between the two is repaired and
/// logged, never surfaced.
pub async fn recompute_status(pool: &SqlitePool, document_id: Uuid) -> AppResult<Document> {
    let row: Option<DbDocument> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
        .bind(document_id.to_string())
        .fetch_optional(pool)
        .await?;
    let document = match row {
        Some(row) => Document::try_from(row)?,
        None => return Err(AppError::not_found(format!("document {document_id}"))),
    };

    let completed: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM document_signatures WHERE document_id = ?")
            .bind(document_id.to_string())
            .fetch_one(pool)
            .await?;

    if completed != document.signature_count {
        tracing::warn!(
            document_id = %document_id,
            stored = document.signature_count,
            counted = completed,
            "signature count drift repaired"
        );
    }

    let next_status = next_status(document.status, completed, document.requires_signatures);

    sqlx::query(
        "UPDATE documents SET status = ?, signature_count = ?, updated_at = ? WHERE id = ?",
    )
    .bind(next_status.as_str())
    .bind(completed)
    .bind(crate::utils::utc_now())
    .bind(document_id.to_string())
    .execute(pool)
    .await?;

    Ok(Document {
        status: next_status,
        signature_count: completed,
        ..document
    })
}

/// Forward-only: `signed` is terminal for this path, `in_review` never falls
/// back to `pending`, and reject/archive are untouched (they are operator
/// transitions, not count-driven ones).
fn next_status(current: DocumentStatus, completed: i64, required: i64) -> DocumentStatus {
    match current {
        DocumentStatus::Signed | DocumentStatus::Rejected | DocumentStatus::Archived => current,
        DocumentStatus::Pending | DocumentStatus::InReview => {
            if completed >= required {
                DocumentStatus::Signed
            } else if completed > 0 {
                DocumentStatus::InReview
            } else {
                current
            }
        }
    }
}

/// Whether an operator may move a document into `status` by hand. Only
/// reject and archive are manual transitions, and only from states where
/// the workflow has not completed.
pub fn manual_transition_allowed(current: DocumentStatus, requested: DocumentStatus) -> bool {
    matches!(requested, DocumentStatus::Rejected | DocumentStatus::Archived)
        && !matches!(current, DocumentStatus::Signed)
        && current != requested
}
