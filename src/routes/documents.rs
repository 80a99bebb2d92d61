use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Capability, DocumentContext, PermissionType, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::{
    DbDocument, DbDocumentPermission, Document, DocumentCreateRequest, DocumentPermission,
    DocumentStatusRequest, DocumentStatusResponse, PermissionGrantRequest,
};
use crate::signing::lifecycle;
use crate::utils::utc_now;

#[utoipa::path(
    post,
    path = "/documents",
    tag = "Documents",
    request_body = DocumentCreateRequest,
    responses(
        (status = 201, description = "Document registered", body = Document),
        (status = 403, description = "Role lacks the create capability")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<DocumentCreateRequest>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    require_capability(&state, &user.role, Capability::Create).await?;

    let requires = payload.requires_signatures.unwrap_or(1);
    if requires < 1 {
        return Err(AppError::bad_request("requires_signatures must be positive"));
    }
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let now = utc_now();
    let document_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO documents (id, owner_id, title, storage_path, status, requires_signatures, signature_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'pending', ?, 0, ?, ?)
        "#,
    )
    .bind(document_id.to_string())
    .bind(auth.user_id.to_string())
    .bind(payload.title.trim())
    .bind(&payload.storage_path)
    .bind(requires)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let document = fetch_document(&state.pool, document_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &document,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(document)))
}

#[utoipa::path(
    get,
    path = "/documents",
    tag = "Documents",
    responses((status = 200, description = "Documents visible to the caller", body = [Document])),
    security(("bearerAuth" = []))
)]
pub async fn list_documents(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Document>>> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);

    let rows: Vec<DbDocument> = sqlx::query_as("SELECT * FROM documents ORDER BY created_at DESC")
        .fetch_all(&state.pool)
        .await?;

    // Visibility is the resolver's view decision, document by document.
    let mut visible = Vec::new();
    for row in rows {
        let document = Document::try_from(row)?;
        let context = document_context(&state.pool, &document).await?;
        if authz::can_access(&state.pool, &actor, &context, PermissionType::View).await? {
            visible.push(document);
        }
    }

    Ok(Json(visible))
}

#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document detail", body = Document),
        (status = 403, description = "No view access"),
        (status = 404, description = "Document not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);
    let document = fetch_document(&state.pool, id).await?;

    let context = document_context(&state.pool, &document).await?;
    if !authz::can_access(&state.pool, &actor, &context, PermissionType::View).await? {
        return Err(AppError::forbidden("no view access to this document"));
    }

    Ok(Json(document))
}

#[utoipa::path(
    put,
    path = "/documents/{id}/status",
    tag = "Documents",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = DocumentStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = DocumentStatusResponse),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Only the owner or an admin may do this")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentStatusRequest>,
) -> AppResult<Json<DocumentStatusResponse>> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let document = fetch_document(&state.pool, id).await?;
    let old = document.clone();

    let is_owner = document.owner_id == auth.user_id;
    let is_admin = user.parsed_role() == Some(Role::SystemAdmin);
    if !is_owner && !is_admin {
        return Err(AppError::forbidden("only the owner or an admin may change status"));
    }

    if !lifecycle::manual_transition_allowed(document.status, payload.status) {
        return Err(AppError::bad_request(format!(
            "cannot move document from {} to {}",
            document.status.as_str(),
            payload.status.as_str()
        )));
    }

    let now = utc_now();
    sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
        .bind(payload.status.as_str())
        .bind(now)
        .bind(id.to_string())
        .execute(&state.pool)
        .await?;

    let mut document = document;
    document.status = payload.status;
    document.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "status_changed",
        Some(auth.user_id),
        &document,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(DocumentStatusResponse {
        id: document.id,
        status: document.status,
        signature_count: document.signature_count,
        requires_signatures: document.requires_signatures,
    }))
}

#[utoipa::path(
    get,
    path = "/documents/{id}/permissions",
    tag = "Permissions",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Grants on this document", body = [DocumentPermission]),
        (status = 403, description = "No manage access")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentPermission>>> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);
    let document = fetch_document(&state.pool, id).await?;

    let context = document_context(&state.pool, &document).await?;
    if !authz::can_access(&state.pool, &actor, &context, PermissionType::Manage).await? {
        return Err(AppError::forbidden("no manage access to this document"));
    }

    let rows: Vec<DbDocumentPermission> = sqlx::query_as(
        "SELECT * FROM document_permissions WHERE document_id = ? ORDER BY created_at ASC",
    )
    .bind(id.to_string())
    .fetch_all(&state.pool)
    .await?;

    let grants: Vec<DocumentPermission> =
        rows.into_iter().map(DocumentPermission::try_from).collect::<Result<_, _>>()?;
    Ok(Json(grants))
}

#[utoipa::path(
    post,
    path = "/documents/{id}/permissions",
    tag = "Permissions",
    params(("id" = Uuid, Path, description = "Document id")),
    request_body = PermissionGrantRequest,
    responses(
        (status = 201, description = "Permission granted", body = [DocumentPermission]),
        (status = 403, description = "No manage access"),
        (status = 409, description = "Grant already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<PermissionGrantRequest>,
) -> AppResult<(StatusCode, Json<Vec<DocumentPermission>>)> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);
    let document = fetch_document(&state.pool, id).await?;

    let context = document_context(&state.pool, &document).await?;
    if !authz::can_access(&state.pool, &actor, &context, PermissionType::Manage).await? {
        return Err(AppError::forbidden("no manage access to this document"));
    }

    let grantee_exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ?")
        .bind(payload.user_id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if grantee_exists == 0 {
        return Err(AppError::not_found("grantee not found"));
    }

    let granted = insert_grant(&state.pool, id, payload.user_id, payload.permission_type, auth.user_id).await?;

    // sign implies view; create the companion grant if it is missing.
    let mut created = vec![granted];
    if payload.permission_type == PermissionType::Sign {
        match insert_grant(&state.pool, id, payload.user_id, PermissionType::View, auth.user_id).await {
            Ok(view_grant) => created.push(view_grant),
            Err(AppError::Conflict(_)) => {}
            Err(err) => return Err(err),
        }
    }

    for grant in &created {
        log_activity_with_context(
            &state.event_bus,
            "granted",
            Some(auth.user_id),
            grant,
            None,
            Some(RequestContext::from_headers(&headers)),
        );
    }

    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    delete,
    path = "/documents/{id}/permissions/{permission_id}",
    tag = "Permissions",
    params(
        ("id" = Uuid, Path, description = "Document id"),
        ("permission_id" = Uuid, Path, description = "Grant id")
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 400, description = "View grant still backs a sign grant"),
        (status = 403, description = "No manage access"),
        (status = 404, description = "Grant not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    let actor = super::actor_context(&user);
    let document = fetch_document(&state.pool, id).await?;

    let context = document_context(&state.pool, &document).await?;
    if !authz::can_access(&state.pool, &actor, &context, PermissionType::Manage).await? {
        return Err(AppError::forbidden("no manage access to this document"));
    }

    let row: Option<DbDocumentPermission> =
        sqlx::query_as("SELECT * FROM document_permissions WHERE id = ? AND document_id = ?")
            .bind(permission_id.to_string())
            .bind(id.to_string())
            .fetch_optional(&state.pool)
            .await?;
    let grant = match row {
        Some(row) => DocumentPermission::try_from(row)?,
        None => return Err(AppError::not_found("permission grant not found")),
    };

    // A view grant cannot be pulled out from under a live sign grant.
    if grant.permission_type == PermissionType::View {
        let sign_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM document_permissions WHERE document_id = ? AND user_id = ? AND permission_type = 'sign'",
        )
        .bind(id.to_string())
        .bind(grant.user_id.to_string())
        .fetch_one(&state.pool)
        .await?;
        if sign_count > 0 {
            return Err(AppError::bad_request(
                "revoke the sign permission before removing view",
            ));
        }
    }

    sqlx::query("DELETE FROM document_permissions WHERE id = ?")
        .bind(permission_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "revoked",
        Some(auth.user_id),
        &grant,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn insert_grant(
    pool: &SqlitePool,
    document_id: Uuid,
    user_id: Uuid,
    permission_type: PermissionType,
    granted_by: Uuid,
) -> AppResult<DocumentPermission> {
    let grant = DocumentPermission {
        id: Uuid::new_v4(),
        document_id,
        user_id,
        permission_type,
        granted_by: Some(granted_by),
        created_at: utc_now(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO document_permissions (id, document_id, user_id, permission_type, granted_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(grant.id.to_string())
    .bind(document_id.to_string())
    .bind(user_id.to_string())
    .bind(permission_type.as_str())
    .bind(granted_by.to_string())
    .bind(grant.created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(grant),
        Err(err) if AppError::is_unique_violation(&err) => {
            Err(AppError::conflict("permission already granted"))
        }
        Err(err) => Err(err.into()),
    }
}

pub(super) async fn fetch_document(pool: &SqlitePool, id: Uuid) -> AppResult<Document> {
    let row: Option<DbDocument> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Document::try_from(row),
        None => Err(AppError::not_found("document not found")),
    }
}

pub(super) async fn document_context(pool: &SqlitePool, document: &Document) -> AppResult<DocumentContext> {
    let owner_department: Option<Option<String>> =
        sqlx::query_scalar("SELECT department FROM users WHERE id = ?")
            .bind(document.owner_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(DocumentContext {
        id: document.id,
        owner_id: document.owner_id,
        owner_department: owner_department.flatten(),
    })
}

async fn require_capability(state: &AppState, role: &str, capability: Capability) -> AppResult<()> {
    let role: Role = role
        .parse()
        .map_err(|_| AppError::forbidden("role has no capabilities"))?;
    let table = state.role_cache.table(&state.pool).await;
    if table.allows(role, capability) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "role {} lacks the {} capability",
            role.as_str(),
            capability.as_str()
        )))
    }
}
