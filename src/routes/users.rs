use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Role};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::{DbUser, User, UserUpdateRequest};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "Users the caller may administer", body = [User]),
        (status = 403, description = "Caller cannot list users")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    let caller = super::load_user(&state.pool, auth.user_id).await?;

    let rows: Vec<DbUser> = match caller.parsed_role() {
        Some(Role::SystemAdmin) => {
            sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
                .fetch_all(&state.pool)
                .await?
        }
        // Coordinators only see their own department.
        Some(Role::AreaCoordinator) => {
            let department = caller
                .department
                .as_deref()
                .ok_or_else(|| AppError::forbidden("coordinator has no department"))?;
            sqlx::query_as("SELECT * FROM users WHERE department = ? ORDER BY created_at DESC")
                .bind(department)
                .fetch_all(&state.pool)
                .await?
        }
        _ => return Err(AppError::forbidden("cannot list users")),
    };

    let users: Vec<User> = rows.into_iter().map(User::try_from).collect::<Result<_, _>>()?;
    Ok(Json(users))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 403, description = "Caller cannot manage this user"),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    let caller = super::load_user(&state.pool, auth.user_id).await?;
    let target = fetch_target(&state.pool, id).await?;
    let old = target.clone();

    if !authz::can_manage_user(
        caller.parsed_role(),
        caller.department.as_deref(),
        target.parsed_role(),
        target.department.as_deref(),
    ) {
        return Err(AppError::forbidden("cannot manage this user"));
    }

    let mut target = target;
    if let Some(name) = payload.name {
        target.name = name;
    }
    if let Some(raw_role) = payload.role {
        let role: Role = raw_role
            .parse()
            .map_err(|err: authz::UnknownRole| AppError::bad_request(err.to_string()))?;
        // The new role must also be one the caller may hand out.
        if !authz::can_manage_user(
            caller.parsed_role(),
            caller.department.as_deref(),
            Some(role),
            target.department.as_deref(),
        ) {
            return Err(AppError::forbidden("cannot assign this role"));
        }
        target.role = role.as_str().to_string();
    }
    if payload.department.is_some() {
        target.department = payload.department;
    }

    let now = utc_now();
    sqlx::query("UPDATE users SET name = ?, role = ?, department = ?, updated_at = ? WHERE id = ?")
        .bind(&target.name)
        .bind(&target.role)
        .bind(&target.department)
        .bind(now)
        .bind(target.id.to_string())
        .execute(&state.pool)
        .await?;
    target.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &target,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(target))
}

async fn fetch_target(pool: &SqlitePool, id: Uuid) -> AppResult<User> {
    let row: Option<DbUser> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => User::try_from(row),
        None => Err(AppError::not_found("user not found")),
    }
}
