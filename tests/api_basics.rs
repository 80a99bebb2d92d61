//! Health, auth, and the idempotent-registration behavior.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn health_reports_db_ok() -> Result<()> {
    let app = spawn_app().await?;
    let (status, body) = app.request("GET", "/api/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_ok"], true);
    Ok(())
}

#[tokio::test]
async fn register_login_me_round_trip() -> Result<()> {
    let app = spawn_app().await?;
    let (_, user_id) = app
        .register("Ada", "ada@example.com", "operational_staff", Some("Legal"))
        .await?;

    let (status, body) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = app.request("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user_id.as_str());
    assert_eq!(me["role"], "operational_staff");
    assert_eq!(me["department"], "Legal");

    Ok(())
}

#[tokio::test]
async fn reregistering_is_idempotent_when_credentials_match() -> Result<()> {
    let app = spawn_app().await?;
    let (_, first_id) = app
        .register("Ada", "ada@example.com", "operational_staff", Some("Legal"))
        .await?;

    // same email, same password: the existing profile is returned
    let (status, body) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "name": "Ada Again",
                "email": "ada@example.com",
                "password": "password123",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], first_id.as_str());
    assert_eq!(body["user"]["name"], "Ada");

    // same email, different password: conflict
    let (status, _) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "name": "Impostor",
                "email": "ada@example.com",
                "password": "different-password",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn bad_credentials_and_missing_tokens_are_unauthorized() -> Result<()> {
    let app = spawn_app().await?;
    app.register("Ada", "ada@example.com", "operational_staff", None).await?;

    let (status, _) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request("GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.request("GET", "/auth/me", Some("not-a-token"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn totp_enrollment_gates_login() -> Result<()> {
    use totp_rs::{Algorithm, Secret, TOTP};

    let app = spawn_app().await?;
    let (token, _) = app
        .register("Ada", "ada@example.com", "operational_staff", Some("Legal"))
        .await?;

    let (status, setup) = app.request("POST", "/auth/totp/setup", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let secret = setup["secret"].as_str().unwrap().to_string();
    assert!(setup["otpauth_url"].as_str().unwrap().starts_with("otpauth://totp/"));

    // the password alone is no longer enough
    let (status, _) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({
                "email": "ada@example.com",
                "password": "password123",
                "totp_code": "bogus!",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // a code derived from the enrolled secret gets through
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret).to_bytes().map_err(|e| anyhow::anyhow!("{e:?}"))?,
        Some("firmas".to_string()),
        "ada@example.com".to_string(),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    let code = totp.generate_current()?;

    let (status, body) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({
                "email": "ada@example.com",
                "password": "password123",
                "totp_code": code,
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["totp_enabled"], true);

    Ok(())
}

#[tokio::test]
async fn unknown_role_at_registration_is_rejected() -> Result<()> {
    let app = spawn_app().await?;
    let (status, _) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "name": "Eve",
                "email": "eve@example.com",
                "password": "password123",
                "role": "superuser",
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
