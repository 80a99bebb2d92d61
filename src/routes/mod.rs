pub mod auth;
pub mod certificates;
pub mod documents;
pub mod health;
pub mod rbac;
pub mod signatures;
pub mod users;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::ActorContext;
use crate::errors::{AppError, AppResult};
use crate::models::{DbUser, User};

/// Load the authenticated user's profile. A valid token for a deleted or
/// never-created user is treated as unauthorized, not as a 404.
pub(crate) async fn load_user(pool: &SqlitePool, user_id: Uuid) -> AppResult<User> {
    let row: Option<DbUser> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => User::try_from(row),
        None => Err(AppError::unauthorized("unknown user")),
    }
}

pub(crate) fn actor_context(user: &User) -> ActorContext {
    ActorContext {
        id: user.id,
        role: user.parsed_role(),
        department: user.department.clone(),
    }
}
