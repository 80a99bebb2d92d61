use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::PermissionType;
use crate::errors::AppError;

use super::user::parse_id;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentPermission {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub permission_type: PermissionType,
    pub granted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl crate::events::Loggable for DocumentPermission {
    fn entity_type() -> &'static str { "document_permission" }
    fn subject_id(&self) -> Uuid { self.document_id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbDocumentPermission {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub permission_type: String,
    pub granted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbDocumentPermission> for DocumentPermission {
    type Error = AppError;

    fn try_from(value: DbDocumentPermission) -> Result<Self, Self::Error> {
        Ok(DocumentPermission {
            id: parse_id(&value.id)?,
            document_id: parse_id(&value.document_id)?,
            user_id: parse_id(&value.user_id)?,
            permission_type: value
                .permission_type
                .parse()
                .map_err(|_| AppError::internal(format!("unknown permission type: {}", value.permission_type)))?,
            granted_by: value.granted_by.as_deref().map(parse_id).transpose()?,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionGrantRequest {
    pub user_id: Uuid,
    #[schema(example = "sign")]
    pub permission_type: PermissionType,
}
