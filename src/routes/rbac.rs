//! Role-permission administration. Writes go straight to the store and
//! invalidate the process-wide cache; reads report the effective table
//! (defaults overlaid with stored rows).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{Capability, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, Loggable, RequestContext, Severity};
use crate::jwt::AuthUser;
use crate::utils::utc_now;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RolePermissionEntry {
    pub role: Role,
    pub capability: Capability,
    pub enabled: bool,
}

impl Loggable for RolePermissionEntry {
    fn entity_type() -> &'static str { "role_permission" }
    // Role permissions are global, not per-entity.
    fn subject_id(&self) -> Uuid { Uuid::nil() }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[utoipa::path(
    get,
    path = "/rbac/role-permissions",
    tag = "RBAC",
    responses(
        (status = 200, description = "Effective role-permission table", body = [RolePermissionEntry]),
        (status = 403, description = "Admin only")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<RolePermissionEntry>>> {
    require_admin(&state, auth.user_id).await?;

    let table = state.role_cache.table(&state.pool).await;
    let mut entries = Vec::new();
    for role in Role::ALL {
        for capability in [
            Capability::View,
            Capability::Sign,
            Capability::Manage,
            Capability::Create,
            Capability::Delete,
            Capability::Admin,
        ] {
            entries.push(RolePermissionEntry {
                role,
                capability,
                enabled: table.allows(role, capability),
            });
        }
    }

    Ok(Json(entries))
}

#[utoipa::path(
    put,
    path = "/rbac/role-permissions",
    tag = "RBAC",
    request_body = RolePermissionEntry,
    responses(
        (status = 200, description = "Entry stored and cache invalidated", body = RolePermissionEntry),
        (status = 403, description = "Admin only")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<RolePermissionEntry>,
) -> AppResult<Json<RolePermissionEntry>> {
    require_admin(&state, auth.user_id).await?;

    sqlx::query(
        r#"
        INSERT INTO role_permissions (role, capability, enabled, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(role, capability) DO UPDATE SET enabled = excluded.enabled, updated_at = excluded.updated_at
        "#,
    )
    .bind(payload.role.as_str())
    .bind(payload.capability.as_str())
    .bind(payload.enabled)
    .bind(utc_now())
    .execute(&state.pool)
    .await?;

    state.role_cache.invalidate();

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &payload,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(payload))
}

async fn require_admin(state: &AppState, user_id: Uuid) -> AppResult<()> {
    let user = super::load_user(&state.pool, user_id).await?;
    if user.parsed_role() == Some(Role::SystemAdmin) {
        Ok(())
    } else {
        Err(AppError::forbidden("system_admin only"))
    }
}
