use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

use super::user::parse_id;

/// A signing credential issued for a user. The PEM material itself lives in
/// artifact storage; rows here only carry metadata and the storage keys.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCertificate {
    pub id: Uuid,
    pub user_id: Uuid,
    pub certificate_name: String,
    pub is_active: bool,
    #[serde(skip)]
    pub cert_storage_path: String,
    #[serde(skip)]
    pub key_storage_path: String,
    pub cert_common_name: Option<String>,
    pub cert_email: Option<String>,
    pub cert_organization: Option<String>,
    pub cert_organizational_unit: Option<String>,
    pub cert_country: Option<String>,
    pub cert_serial_number: Option<String>,
    pub cert_fingerprint_sha256: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl crate::events::Loggable for UserCertificate {
    fn entity_type() -> &'static str { "user_certificate" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUserCertificate {
    pub id: String,
    pub user_id: String,
    pub certificate_name: String,
    pub is_active: bool,
    pub cert_storage_path: String,
    pub key_storage_path: String,
    pub cert_common_name: Option<String>,
    pub cert_email: Option<String>,
    pub cert_organization: Option<String>,
    pub cert_organizational_unit: Option<String>,
    pub cert_country: Option<String>,
    pub cert_serial_number: Option<String>,
    pub cert_fingerprint_sha256: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbUserCertificate> for UserCertificate {
    type Error = AppError;

    fn try_from(value: DbUserCertificate) -> Result<Self, Self::Error> {
        Ok(UserCertificate {
            id: parse_id(&value.id)?,
            user_id: parse_id(&value.user_id)?,
            certificate_name: value.certificate_name,
            is_active: value.is_active,
            cert_storage_path: value.cert_storage_path,
            key_storage_path: value.key_storage_path,
            cert_common_name: value.cert_common_name,
            cert_email: value.cert_email,
            cert_organization: value.cert_organization,
            cert_organizational_unit: value.cert_organizational_unit,
            cert_country: value.cert_country,
            cert_serial_number: value.cert_serial_number,
            cert_fingerprint_sha256: value.cert_fingerprint_sha256,
            valid_from: value.valid_from,
            valid_to: value.valid_to,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CertificateIssueRequest {
    #[schema(example = "Firma institucional")]
    pub certificate_name_prefix: Option<String>,
    /// Requested lifetime; clamped to the allowed window server-side.
    #[schema(example = 365)]
    pub days_valid: Option<i64>,
    #[schema(example = "Legal")]
    pub organizational_unit_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CertificateIssueResponse {
    pub certificate_id: Uuid,
    pub certificate_name: String,
}
