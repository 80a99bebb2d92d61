use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::app::AppState;
use crate::certs;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::{CertificateIssueRequest, CertificateIssueResponse, UserCertificate};

#[utoipa::path(
    post,
    path = "/certificates",
    tag = "Certificates",
    request_body = CertificateIssueRequest,
    responses(
        (status = 201, description = "Certificate issued", body = CertificateIssueResponse),
        (status = 500, description = "External issuer failed; nothing was stored")
    ),
    security(("bearerAuth" = []))
)]
pub async fn issue_certificate(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CertificateIssueRequest>,
) -> AppResult<(StatusCode, Json<CertificateIssueResponse>)> {
    let user = super::load_user(&state.pool, auth.user_id).await?;

    let certificate = certs::issue(
        &state.pool,
        state.store.as_ref(),
        state.issuer.as_ref(),
        &user,
        certs::IssueParams {
            certificate_name_prefix: payload.certificate_name_prefix,
            days_valid: payload.days_valid,
            organizational_unit: payload.organizational_unit_name,
        },
    )
    .await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &certificate,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((
        StatusCode::CREATED,
        Json(CertificateIssueResponse {
            certificate_id: certificate.id,
            certificate_name: certificate.certificate_name,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/certificates",
    tag = "Certificates",
    responses((status = 200, description = "Caller's active certificates, newest first", body = [UserCertificate])),
    security(("bearerAuth" = []))
)]
pub async fn list_certificates(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<UserCertificate>>> {
    let certificates = certs::list_active(&state.pool, auth.user_id).await?;
    Ok(Json(certificates))
}
