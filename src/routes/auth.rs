use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use totp_rs::{Algorithm, Secret, TOTP};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Role;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User};
use crate::utils::{hash_password, utc_now, verify_password};

const TOTP_ISSUER: &str = "firmas";

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TotpSetupResponse {
    /// Base32 secret for the authenticator app.
    pub secret: String,
    pub otpauth_url: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 200, description = "Profile already existed, credentials matched", body = AuthResponse),
        (status = 409, description = "Email already in use with different credentials")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let role = match payload.role.as_deref() {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|err| AppError::bad_request(err.to_string()))?,
        None => Role::ExternalPersonnel,
    };

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    // Ensure-profile semantics: the insert is a no-op when the email is
    // taken, and re-registering with matching credentials just returns the
    // existing profile.
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, department, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(email) DO NOTHING
        "#,
    )
    .bind(user_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(&payload.department)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        let existing = fetch_user_by_email(&state.pool, &payload.email)
            .await?
            .ok_or_else(|| AppError::conflict("email already in use"))?;
        if !verify_password(&payload.password, &existing.password_hash)? {
            return Err(AppError::conflict("email already in use"));
        }

        let user: User = existing.try_into()?;
        let token = state.jwt.encode(user.id)?;
        return Ok((StatusCode::OK, Json(AuthResponse { token, user })));
    }

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = fetch_user_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    // An enrolled two-factor secret makes the code a hard requirement.
    if let Some(secret) = db_user.totp_secret.as_deref() {
        let code = payload
            .totp_code
            .as_deref()
            .ok_or_else(|| AppError::unauthorized("two-factor code required"))?;
        let totp = totp_client(secret, &db_user.email)?;
        let accepted = totp
            .check_current(code)
            .map_err(|err| AppError::internal(err.to_string()))?;
        if !accepted {
            return Err(AppError::unauthorized("invalid two-factor code"));
        }
    }

    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    log_activity_with_context(
        &state.event_bus,
        "login",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let user = super::load_user(&state.pool, auth.user_id).await?;
    Ok(Json(user))
}

#[utoipa::path(
    post,
    path = "/auth/totp/setup",
    tag = "Auth",
    responses((status = 200, description = "Two-factor secret enrolled", body = TotpSetupResponse)),
    security(("bearerAuth" = []))
)]
pub async fn totp_setup(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
) -> AppResult<Json<TotpSetupResponse>> {
    let user = super::load_user(&state.pool, auth.user_id).await?;

    // Enrolling again rotates the secret; any previous one stops working.
    let secret = Secret::generate_secret().to_encoded().to_string();
    let totp = totp_client(&secret, &user.email)?;

    sqlx::query("UPDATE users SET totp_secret = ?, updated_at = ? WHERE id = ?")
        .bind(&secret)
        .bind(utc_now())
        .bind(user.id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "totp_enrolled",
        Some(auth.user_id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(TotpSetupResponse {
        otpauth_url: totp.get_url(),
        secret,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged"))
)]
pub async fn logout(_auth: AuthUser) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

fn totp_client(secret: &str, account: &str) -> Result<TOTP, AppError> {
    let secret_bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|err| AppError::internal(format!("stored two-factor secret is invalid: {err:?}")))?;

    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret_bytes,
        Some(TOTP_ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|err| AppError::internal(format!("failed to build totp client: {err}")))
}

async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}
