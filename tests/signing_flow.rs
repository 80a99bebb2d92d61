//! The multi-signature workflow end to end: threshold progression,
//! double-sign rejection, concurrent distinct signers, and manual
//! reject/archive transitions.

mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn document_progresses_pending_in_review_signed() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (colleague_a, _) = app
        .register("Colleague A", "a@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (colleague_b, _) = app
        .register("Colleague B", "b@example.com", "operational_staff", Some("Legal"))
        .await?;

    let doc = app.create_document(&owner, "triple-sign", 3).await?;

    let (status, body) = app.sign(&owner, &doc, "first").await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["document_status"], "in_review");
    assert_eq!(body["signatures_completed"], 1);
    assert_eq!(body["signatures_required"], 3);

    let (status, body) = app.sign(&colleague_a, &doc, "second").await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["document_status"], "in_review");
    assert_eq!(body["signatures_completed"], 2);

    // completion happens at exactly the threshold
    let (status, body) = app.sign(&colleague_b, &doc, "third").await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["document_status"], "signed");
    assert_eq!(body["signatures_completed"], 3);

    let (_, listed) = app
        .request("GET", &format!("/documents/{doc}/signatures"), Some(&owner), None)
        .await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(3));

    Ok(())
}

#[tokio::test]
async fn signing_twice_is_rejected_without_double_counting() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&owner, "once-only", 2).await?;

    let (status, _) = app.sign(&owner, &doc, "first").await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.sign(&owner, &doc, "again").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "already_signed");

    let (_, document) = app.request("GET", &format!("/documents/{doc}"), Some(&owner), None).await?;
    assert_eq!(document["signature_count"], 1);
    assert_eq!(document["status"], "in_review");

    Ok(())
}

#[tokio::test]
async fn duplicate_sign_is_reported_before_certificate_problems() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (grace, _) = app
        .register("Grace", "grace@example.com", "operational_staff", Some("Legal"))
        .await?;

    let doc = app.create_document(&owner, "precedence", 2).await?;
    let (status, _) = app.sign(&owner, &doc, "first").await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, cert) = app
        .request("POST", "/certificates", Some(&grace), Some(json!({})))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let foreign_cert = cert["certificate_id"].as_str().unwrap();

    // the caller already signed; that answer wins over the foreign certificate
    let (status, body) = app
        .request(
            "POST",
            &format!("/documents/{doc}/sign"),
            Some(&owner),
            Some(json!({ "reason": "again", "certificate_id": foreign_cert })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "already_signed");

    Ok(())
}

#[tokio::test]
async fn concurrent_distinct_signers_both_land() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (peer, _) = app
        .register("Peer", "peer@example.com", "operational_staff", Some("Legal"))
        .await?;

    let doc = app.create_document(&owner, "race", 3).await?;

    let (first, second) = tokio::join!(
        app.sign(&owner, &doc, "racing owner"),
        app.sign(&peer, &doc, "racing peer"),
    );
    assert_eq!(first?.0, StatusCode::CREATED);
    assert_eq!(second?.0, StatusCode::CREATED);

    let (_, document) = app.request("GET", &format!("/documents/{doc}"), Some(&owner), None).await?;
    assert_eq!(document["signature_count"], 2);
    assert_eq!(document["status"], "in_review");

    Ok(())
}

#[tokio::test]
async fn signed_is_terminal_and_in_review_never_regresses() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&owner, "terminal", 1).await?;

    let (_, body) = app.sign(&owner, &doc, "only one needed").await?;
    assert_eq!(body["document_status"], "signed");

    // a signed document cannot be rejected
    let (status, _) = app
        .request(
            "PUT",
            &format!("/documents/{doc}/status"),
            Some(&owner),
            Some(json!({ "status": "rejected" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn owner_or_admin_may_reject_or_archive() -> Result<()> {
    let app = spawn_app().await?;

    let (admin, _) = app.register("Admin", "admin@example.com", "system_admin", None).await?;
    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (peer, _) = app
        .register("Peer", "peer@example.com", "operational_staff", Some("Legal"))
        .await?;

    let doc = app.create_document(&owner, "rejectable", 2).await?;

    // a non-owner, non-admin cannot change status even with view access
    let (status, _) = app
        .request(
            "PUT",
            &format!("/documents/{doc}/status"),
            Some(&peer),
            Some(json!({ "status": "rejected" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            "PUT",
            &format!("/documents/{doc}/status"),
            Some(&admin),
            Some(json!({ "status": "rejected" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let doc2 = app.create_document(&owner, "archivable", 2).await?;
    let (status, _) = app
        .request(
            "PUT",
            &format!("/documents/{doc2}/status"),
            Some(&owner),
            Some(json!({ "status": "archived" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}
