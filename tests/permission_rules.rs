//! Grant semantics: sign implies view, view cannot be revoked while sign
//! remains, and duplicate grants conflict.

mod common;

use anyhow::Result;
use axum::http::StatusCode;

use common::spawn_app;

#[tokio::test]
async fn granting_sign_auto_creates_view() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (_, external_id) = app
        .register("External", "external@example.com", "external_personnel", None)
        .await?;

    let doc = app.create_document(&owner, "grant-target", 1).await?;

    let (status, created) = app.grant(&owner, &doc, &external_id, "sign").await?;
    assert_eq!(status, StatusCode::CREATED);
    let types: Vec<&str> = created
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["permission_type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"sign"));
    assert!(types.contains(&"view"));

    Ok(())
}

#[tokio::test]
async fn duplicate_grant_conflicts_and_existing_view_is_tolerated() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (_, external_id) = app
        .register("External", "external@example.com", "external_personnel", None)
        .await?;

    let doc = app.create_document(&owner, "dup-grants", 1).await?;

    let (status, _) = app.grant(&owner, &doc, &external_id, "view").await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.grant(&owner, &doc, &external_id, "view").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // sign grant succeeds even though its companion view already exists
    let (status, created) = app.grant(&owner, &doc, &external_id, "sign").await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.as_array().map(Vec::len), Some(1));

    let (status, _) = app.grant(&owner, &doc, &external_id, "sign").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn view_cannot_be_revoked_while_sign_exists() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (_, external_id) = app
        .register("External", "external@example.com", "external_personnel", None)
        .await?;

    let doc = app.create_document(&owner, "revoke-rules", 1).await?;
    app.grant(&owner, &doc, &external_id, "sign").await?;

    let (_, grants) = app
        .request("GET", &format!("/documents/{doc}/permissions"), Some(&owner), None)
        .await?;
    let grants = grants.as_array().unwrap();
    let view_id = grants
        .iter()
        .find(|g| g["permission_type"] == "view")
        .and_then(|g| g["id"].as_str())
        .unwrap()
        .to_string();
    let sign_id = grants
        .iter()
        .find(|g| g["permission_type"] == "sign")
        .and_then(|g| g["id"].as_str())
        .unwrap()
        .to_string();

    // view is pinned by the sign grant
    let (status, _) = app
        .request(
            "DELETE",
            &format!("/documents/{doc}/permissions/{view_id}"),
            Some(&owner),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // revoke sign first, then view goes through
    let (status, _) = app
        .request(
            "DELETE",
            &format!("/documents/{doc}/permissions/{sign_id}"),
            Some(&owner),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .request(
            "DELETE",
            &format!("/documents/{doc}/permissions/{view_id}"),
            Some(&owner),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn revoked_signer_loses_access_again() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (external, external_id) = app
        .register("External", "external@example.com", "external_personnel", None)
        .await?;

    let doc = app.create_document(&owner, "revocable", 2).await?;
    app.grant(&owner, &doc, &external_id, "sign").await?;

    let (_, grants) = app
        .request("GET", &format!("/documents/{doc}/permissions"), Some(&owner), None)
        .await?;
    for grant in grants.as_array().unwrap() {
        let grant_id = grant["id"].as_str().unwrap();
        // remove sign before view so the dependency rule allows both
        if grant["permission_type"] == "sign" {
            let (status, _) = app
                .request(
                    "DELETE",
                    &format!("/documents/{doc}/permissions/{grant_id}"),
                    Some(&owner),
                    None,
                )
                .await?;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }
    }

    let (status, _) = app.sign(&external, &doc, "should fail").await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
