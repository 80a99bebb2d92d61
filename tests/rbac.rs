//! Role-permission administration and its interaction with the cache:
//! writes are admin-only and must be visible on the next request.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn role_permission_admin_is_system_admin_only() -> Result<()> {
    let app = spawn_app().await?;

    let (staff, _) = app
        .register("Staff", "staff@example.com", "operational_staff", Some("Legal"))
        .await?;

    let (status, _) = app.request("GET", "/rbac/role-permissions", Some(&staff), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            "PUT",
            "/rbac/role-permissions",
            Some(&staff),
            Some(json!({ "role": "operational_staff", "capability": "admin", "enabled": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn effective_table_starts_from_defaults() -> Result<()> {
    let app = spawn_app().await?;
    let (admin, _) = app.register("Admin", "admin@example.com", "system_admin", None).await?;

    let (status, entries) = app.request("GET", "/rbac/role-permissions", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);

    let entries = entries.as_array().unwrap().clone();
    let lookup = |role: &str, capability: &str| {
        entries
            .iter()
            .find(|e| e["role"] == role && e["capability"] == capability)
            .and_then(|e| e["enabled"].as_bool())
            .unwrap()
    };

    assert!(lookup("system_admin", "admin"));
    assert!(lookup("external_personnel", "sign"));
    assert!(!lookup("external_personnel", "create"));
    assert!(!lookup("operational_staff", "delete"));

    Ok(())
}

#[tokio::test]
async fn disabling_create_takes_effect_immediately() -> Result<()> {
    let app = spawn_app().await?;

    let (admin, _) = app.register("Admin", "admin@example.com", "system_admin", None).await?;
    let (staff, _) = app
        .register("Staff", "staff@example.com", "operational_staff", Some("Legal"))
        .await?;

    // baseline: staff can create
    app.create_document(&staff, "before-change", 1).await?;

    let (status, _) = app
        .request(
            "PUT",
            "/rbac/role-permissions",
            Some(&admin),
            Some(json!({ "role": "operational_staff", "capability": "create", "enabled": false })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    // the write invalidated the cache, so the change is visible despite TTL
    let (status, _) = app
        .request(
            "POST",
            "/documents",
            Some(&staff),
            Some(json!({ "title": "after-change", "storage_path": "x.pdf" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // and re-enabling restores it
    app.request(
        "PUT",
        "/rbac/role-permissions",
        Some(&admin),
        Some(json!({ "role": "operational_staff", "capability": "create", "enabled": true })),
    )
    .await?;
    app.create_document(&staff, "restored", 1).await?;

    Ok(())
}
