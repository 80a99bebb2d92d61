use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, PermissionType};
use crate::certs;
use crate::collaborator::SignPdfRequest;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::{
    DocumentSignature, SignRequest, SignResponse, SignWithCertificateRequest, VerifyRequest,
    VerifyResponse,
};
use crate::signing;

#[utoipa::path(
    post,
    path = "/documents/{id}/sign",
    tag = "Signatures",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = SignRequest,
    responses(
        (status = 201, description = "Signature recorded", body = SignResponse),
        (status = 400, description = "Already signed or invalid certificate"),
        (status = 403, description = "No sign permission"),
        (status = 404, description = "Document not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn sign_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<SignRequest>,
) -> AppResult<(StatusCode, Json<SignResponse>)> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);

    let document = super::documents::fetch_document(&state.pool, id).await?;
    let context = super::documents::document_context(&state.pool, &document).await?;
    if !authz::can_access(&state.pool, &actor, &context, PermissionType::Sign).await? {
        return Err(AppError::forbidden("no sign permission on this document"));
    }

    // A duplicate is reported before any certificate problem; the constraint
    // inside record_signature still settles concurrent attempts.
    if signing::has_signature(&state.pool, id, auth.user_id).await? {
        return Err(AppError::AlreadySigned);
    }

    if let Some(certificate_id) = payload.certificate_id {
        certs::resolve_for_signing(&state.pool, auth.user_id, certificate_id).await?;
    }

    let recorded = signing::record_signature(
        &state.pool,
        &actor,
        id,
        payload.certificate_id,
        payload.reason,
        None,
    )
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "signed",
        Some(auth.user_id),
        &recorded.signature,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((
        StatusCode::CREATED,
        Json(SignResponse {
            signature_id: recorded.signature.id,
            signature_hash: recorded.signature.signature_hash,
            document_status: recorded.document.status,
            signatures_completed: recorded.document.signature_count,
            signatures_required: recorded.document.requires_signatures,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/documents/{id}/signatures",
    tag = "Signatures",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Signatures on this document", body = [DocumentSignature]),
        (status = 403, description = "No view access"),
        (status = 404, description = "Document not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_signatures(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentSignature>>> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);
    let document = super::documents::fetch_document(&state.pool, id).await?;

    let context = super::documents::document_context(&state.pool, &document).await?;
    if !authz::can_access(&state.pool, &actor, &context, PermissionType::View).await? {
        return Err(AppError::forbidden("no view access to this document"));
    }

    let signatures = signing::list_signatures(&state.pool, id).await?;
    Ok(Json(signatures))
}

#[utoipa::path(
    post,
    path = "/sign-with-user-cert",
    tag = "Signatures",
    request_body = SignWithCertificateRequest,
    responses(
        (status = 200, description = "Signed PDF bytes; X-Signature-Id and X-Signature-Hash carry the recorded row"),
        (status = 400, description = "Already signed, invalid certificate, or bad payload"),
        (status = 403, description = "No sign permission"),
        (status = 500, description = "External signing service failed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn sign_with_user_cert(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<SignWithCertificateRequest>,
) -> AppResult<Response> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);

    let pdf = BASE64
        .decode(&payload.pdf_base64)
        .map_err(|_| AppError::bad_request("pdf_base64 is not valid base64"))?;

    // Check sign access and the duplicate up front so an ineligible caller
    // never reaches the certificate or the external signer.
    let document = super::documents::fetch_document(&state.pool, payload.document_id).await?;
    let context = super::documents::document_context(&state.pool, &document).await?;
    if !authz::can_access(&state.pool, &actor, &context, PermissionType::Sign).await? {
        return Err(AppError::forbidden("no sign permission on this document"));
    }
    if signing::has_signature(&state.pool, payload.document_id, auth.user_id).await? {
        return Err(AppError::AlreadySigned);
    }

    let certificate = certs::resolve_for_signing(&state.pool, auth.user_id, payload.certificate_id).await?;

    let certificate_pem = state.store.get(&certificate.cert_storage_path).await?;
    let private_key_pem = state.store.get(&certificate.key_storage_path).await?;

    let reason = payload.reason.clone().unwrap_or_else(|| "Signed electronically".to_string());
    let signed = state
        .signer
        .sign_pdf(&SignPdfRequest {
            pdf,
            certificate_pem,
            private_key_pem,
            signer_name: user.name.clone(),
            reason: reason.clone(),
        })
        .await?;

    // Artifact first, row second; losing the race to another signature
    // removes the artifact again.
    let artifact_key = format!("{}/signed/{}.pdf", auth.user_id, payload.document_id);
    state.store.put(&artifact_key, &signed.pdf).await?;

    let recorded = match signing::record_signature(
        &state.pool,
        &actor,
        payload.document_id,
        Some(certificate.id),
        Some(reason),
        Some(signed.signature_hash.clone()),
    )
    .await
    {
        Ok(recorded) => recorded,
        Err(err) => {
            if let Err(cleanup) = state.store.remove(&artifact_key).await {
                tracing::warn!(key = %artifact_key, error = %cleanup, "failed to remove signed artifact after aborted signature");
            }
            return Err(err);
        }
    };

    log_activity_with_context(
        &state.event_bus,
        "signed",
        Some(auth.user_id),
        &recorded.signature,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    let response = (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::HeaderName::from_static("x-signature-id"),
                recorded.signature.id.to_string(),
            ),
            (
                header::HeaderName::from_static("x-signature-hash"),
                recorded.signature.signature_hash,
            ),
        ],
        signed.pdf,
    );
    Ok(response.into_response())
}

#[utoipa::path(
    post,
    path = "/verify-signatures",
    tag = "Signatures",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Per-signature verification report", body = VerifyResponse),
        (status = 400, description = "Bad payload"),
        (status = 500, description = "External signing service failed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn verify_signatures(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<VerifyRequest>,
) -> AppResult<Json<VerifyResponse>> {
    let pdf = BASE64
        .decode(&payload.pdf_base64)
        .map_err(|_| AppError::bad_request("pdf_base64 is not valid base64"))?;

    let report = signing::verify_pdf(state.signer.as_ref(), &pdf).await?;
    Ok(Json(report))
}
