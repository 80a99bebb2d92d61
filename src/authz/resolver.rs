use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::AppResult;

use super::role::{PermissionType, Role};

/// The facts about the requesting user that access decisions need. `role` is
/// `None` when the stored role string is unrecognized, which resolves to no
/// permissions rather than an error.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub id: Uuid,
    pub role: Option<Role>,
    pub department: Option<String>,
}

/// The facts about the target document: who uploaded it and which department
/// the uploader belongs to.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_department: Option<String>,
}

/// Decides whether `actor` may perform `permission` on `document`.
///
/// Decision order, first match wins:
/// 1. document owner (view/sign/manage on own uploads, regardless of role)
/// 2. system_admin
/// 3. area_coordinator: view/sign anywhere, manage only in own department
/// 4. operational_staff: own department only
/// 5. external_personnel: explicit document_permissions row only
/// 6. unrecognized role: deny
pub async fn can_access(
    pool: &SqlitePool,
    actor: &ActorContext,
    document: &DocumentContext,
    permission: PermissionType,
) -> AppResult<bool> {
    if actor.id == document.owner_id {
        return Ok(true);
    }

    let allowed = match actor.role {
        Some(Role::SystemAdmin) => true,
        Some(Role::AreaCoordinator) => match permission {
            PermissionType::Manage => same_department(actor, document),
            PermissionType::View | PermissionType::Sign => true,
        },
        Some(Role::OperationalStaff) => same_department(actor, document),
        Some(Role::ExternalPersonnel) => has_explicit_grant(pool, document.id, actor.id, permission).await?,
        None => {
            tracing::debug!(user_id = %actor.id, "unrecognized role, denying");
            false
        }
    };

    Ok(allowed)
}

/// Whether `actor` may edit `target`'s profile (role, department).
pub fn can_manage_user(
    actor_role: Option<Role>,
    actor_department: Option<&str>,
    target_role: Option<Role>,
    target_department: Option<&str>,
) -> bool {
    match actor_role {
        Some(Role::SystemAdmin) => true,
        Some(Role::AreaCoordinator) => {
            // coordinators never touch admins or other coordinators
            if matches!(target_role, Some(Role::SystemAdmin) | Some(Role::AreaCoordinator)) {
                return false;
            }
            actor_department.is_some() && actor_department == target_department
        }
        _ => false,
    }
}

fn same_department(actor: &ActorContext, document: &DocumentContext) -> bool {
    actor.department == document.owner_department
}

async fn has_explicit_grant(
    pool: &SqlitePool,
    document_id: Uuid,
    user_id: Uuid,
    permission: PermissionType,
) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM document_permissions WHERE document_id = ? AND user_id = ? AND permission_type = ?",
    )
    .bind(document_id.to_string())
    .bind(user_id.to_string())
    .bind(permission.as_str())
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}
