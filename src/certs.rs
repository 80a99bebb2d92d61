//! Certificate issuance and lookup. Key material never touches the database:
//! the collaborator generates the PEMs, the artifact store keeps them, and
//! the `user_certificates` row records metadata plus the storage keys.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::collaborator::{CertificateIssuer, IssueRequest};
use crate::errors::{AppError, AppResult};
use crate::models::{DbUserCertificate, User, UserCertificate};
use crate::storage::ArtifactStore;
use crate::utils;

pub const MIN_DAYS_VALID: i64 = 30;
pub const MAX_DAYS_VALID: i64 = 3650;

const DEFAULT_COUNTRY: &str = "MX";
const DEFAULT_ORGANIZATION: &str = "Casa Monarca";

pub struct IssueParams {
    pub certificate_name_prefix: Option<String>,
    pub days_valid: Option<i64>,
    pub organizational_unit: Option<String>,
}

/// Issue a signing certificate for `user`. Storage happens before the DB
/// insert; any failure after an artifact is written removes what was
/// already stored so no orphaned key material remains.
pub async fn issue(
    pool: &SqlitePool,
    store: &dyn ArtifactStore,
    issuer: &dyn CertificateIssuer,
    user: &User,
    params: IssueParams,
) -> AppResult<UserCertificate> {
    let days_valid = params
        .days_valid
        .unwrap_or(365)
        .clamp(MIN_DAYS_VALID, MAX_DAYS_VALID);

    let organizational_unit = params
        .organizational_unit
        .or_else(|| user.department.clone())
        .unwrap_or_else(|| "General".to_string());

    let issued = issuer
        .generate(&IssueRequest {
            user_name: user.name.clone(),
            email: user.email.clone(),
            country: DEFAULT_COUNTRY.to_string(),
            organization: DEFAULT_ORGANIZATION.to_string(),
            organizational_unit: organizational_unit.clone(),
            days_valid,
        })
        .await?;

    let certificate_id = Uuid::new_v4();
    let prefix = params
        .certificate_name_prefix
        .unwrap_or_else(|| "certificate".to_string());
    let certificate_name = format!("{prefix}-{}", Utc::now().format("%Y%m%d%H%M%S"));

    let cert_key = format!("{}/certificates/{certificate_id}.pem", user.id);
    let key_key = format!("{}/private_keys/{certificate_id}.pem", user.id);

    store.put(&cert_key, &issued.certificate_pem).await?;
    if let Err(err) = store.put(&key_key, &issued.private_key_pem).await {
        compensate(store, &[&cert_key]).await;
        return Err(err.into());
    }

    let info = issued.info.unwrap_or_default();
    let fingerprint = info
        .fingerprint_sha256
        .unwrap_or_else(|| utils::sha256_hex(&issued.certificate_pem));
    let valid_from = parse_wire_timestamp(info.valid_from.as_deref());
    let valid_to = parse_wire_timestamp(info.valid_to.as_deref());
    let now = utils::utc_now();

    let insert = sqlx::query(
        r#"
        INSERT INTO user_certificates (
            id, user_id, certificate_name, is_active,
            cert_storage_path, key_storage_path,
            cert_common_name, cert_email, cert_organization,
            cert_organizational_unit, cert_country,
            cert_serial_number, cert_fingerprint_sha256,
            valid_from, valid_to, created_at
        )
        VALUES (?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(certificate_id.to_string())
    .bind(user.id.to_string())
    .bind(&certificate_name)
    .bind(&cert_key)
    .bind(&key_key)
    .bind(info.common_name.as_deref().unwrap_or(&user.name))
    .bind(info.email_address.as_deref().unwrap_or(&user.email))
    .bind(info.organization_name.as_deref().unwrap_or(DEFAULT_ORGANIZATION))
    .bind(
        info.organizational_unit_name
            .as_deref()
            .unwrap_or(&organizational_unit),
    )
    .bind(info.country_name.as_deref().unwrap_or(DEFAULT_COUNTRY))
    .bind(&info.serial_number)
    .bind(&fingerprint)
    .bind(valid_from)
    .bind(valid_to)
    .bind(now)
    .execute(pool)
    .await;

    if let Err(err) = insert {
        compensate(store, &[&cert_key, &key_key]).await;
        return Err(err.into());
    }

    fetch(pool, certificate_id).await
}

/// The caller's active certificates, newest first.
pub async fn list_active(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<UserCertificate>> {
    let rows: Vec<DbUserCertificate> = sqlx::query_as(
        "SELECT * FROM user_certificates WHERE user_id = ? AND is_active = 1 ORDER BY created_at DESC",
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(UserCertificate::try_from).collect()
}

/// Resolve a certificate for signing: it must exist, belong to `user_id`,
/// and still be active. Anything else is an invalid-certificate error, not
/// a not-found, so callers cannot probe other users' credentials.
pub async fn resolve_for_signing(
    pool: &SqlitePool,
    user_id: Uuid,
    certificate_id: Uuid,
) -> AppResult<UserCertificate> {
    let row: Option<DbUserCertificate> = sqlx::query_as("SELECT * FROM user_certificates WHERE id = ?")
        .bind(certificate_id.to_string())
        .fetch_optional(pool)
        .await?;

    let certificate = match row {
        Some(row) => UserCertificate::try_from(row)?,
        None => return Err(AppError::invalid_certificate("certificate not found")),
    };

    if certificate.user_id != user_id {
        return Err(AppError::invalid_certificate("certificate belongs to another user"));
    }
    if !certificate.is_active {
        return Err(AppError::invalid_certificate("certificate is not active"));
    }

    Ok(certificate)
}

async fn fetch(pool: &SqlitePool, id: Uuid) -> AppResult<UserCertificate> {
    let row: DbUserCertificate = sqlx::query_as("SELECT * FROM user_certificates WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    UserCertificate::try_from(row)
}

async fn compensate(store: &dyn ArtifactStore, keys: &[&str]) {
    for key in keys {
        if let Err(err) = store.remove(key).await {
            tracing::warn!(key, error = %err, "failed to clean up artifact after aborted issuance");
        }
    }
}

fn parse_wire_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // openssl-style "Jan  2 15:04:05 2026 GMT"
            chrono::NaiveDateTime::parse_from_str(raw, "%b %e %H:%M:%S %Y GMT")
                .map(|naive| naive.and_utc())
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_timestamps_accept_rfc3339_and_openssl_formats() {
        assert!(parse_wire_timestamp(Some("2026-08-30T12:00:00+00:00")).is_some());
        assert!(parse_wire_timestamp(Some("Jan  2 15:04:05 2027 GMT")).is_some());
        assert!(parse_wire_timestamp(Some("not a date")).is_none());
        assert!(parse_wire_timestamp(None).is_none());
    }

    #[test]
    fn days_valid_is_clamped_to_the_allowed_window() {
        assert_eq!(5i64.clamp(MIN_DAYS_VALID, MAX_DAYS_VALID), 30);
        assert_eq!(365i64.clamp(MIN_DAYS_VALID, MAX_DAYS_VALID), 365);
        assert_eq!(99999i64.clamp(MIN_DAYS_VALID, MAX_DAYS_VALID), 3650);
    }
}
