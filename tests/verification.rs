//! The embedded-signature path: sign-with-user-cert returns the signed PDF
//! with tracking headers, and verification reports each signature
//! separately.

mod common;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use tower::ServiceExt;

use common::{spawn_app, TestApp};
use firmas::collaborator::FakeCollaborator;

const PDF: &[u8] = b"%PDF-1.4 minimal test document";

async fn issue_certificate(app: &TestApp, token: &str) -> Result<String> {
    let (status, body) = app
        .request("POST", "/certificates", Some(token), Some(json!({})))
        .await?;
    anyhow::ensure!(status == StatusCode::CREATED, "issue failed: {status}");
    Ok(body["certificate_id"].as_str().context("missing id")?.to_string())
}

async fn sign_with_cert_raw(
    app: &TestApp,
    token: &str,
    document_id: &str,
    certificate_id: &str,
) -> Result<(StatusCode, Vec<u8>, Option<String>, Option<String>)> {
    let payload = json!({
        "pdf_base64": BASE64.encode(PDF),
        "certificate_id": certificate_id,
        "document_id": document_id,
        "reason": "integration test",
    });

    let request = Request::builder()
        .method("POST")
        .uri("/sign-with-user-cert")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(payload.to_string()))?;

    let response = app.app.clone().oneshot(request).await?;
    let status = response.status();
    let signature_id = response
        .headers()
        .get("x-signature-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let signature_hash = response
        .headers()
        .get("x-signature-hash")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await?.to_vec();

    Ok((status, bytes, signature_id, signature_hash))
}

#[tokio::test]
async fn sign_with_user_cert_returns_pdf_and_headers() -> Result<()> {
    let app = spawn_app().await?;
    let (token, _) = app
        .register("Ada", "ada@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&token, "embedded-sign", 1).await?;
    let cert = issue_certificate(&app, &token).await?;

    let (status, pdf, signature_id, signature_hash) =
        sign_with_cert_raw(&app, &token, &doc, &cert).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(pdf.starts_with(b"%PDF-1.4"));
    assert!(pdf.len() > PDF.len());
    assert!(signature_id.is_some());
    assert!(signature_hash.is_some());

    // the recorded row carries the collaborator's hash and the certificate
    let (_, signatures) = app
        .request("GET", &format!("/documents/{doc}/signatures"), Some(&token), None)
        .await?;
    assert_eq!(signatures[0]["signature_hash"].as_str(), signature_hash.as_deref());
    assert_eq!(signatures[0]["certificate_id"].as_str(), Some(cert.as_str()));

    // one signature was enough, the document completed
    let (_, document) = app.request("GET", &format!("/documents/{doc}"), Some(&token), None).await?;
    assert_eq!(document["status"], "signed");

    Ok(())
}

#[tokio::test]
async fn verify_reports_each_signature_and_flags_forgeries() -> Result<()> {
    let app = spawn_app().await?;
    let (token, _) = app
        .register("Ada", "ada@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&token, "verify-me", 1).await?;
    let cert = issue_certificate(&app, &token).await?;

    let (_, signed_pdf, _, _) = sign_with_cert_raw(&app, &token, &doc, &cert).await?;

    let (status, report) = app
        .request(
            "POST",
            "/verify-signatures",
            Some(&token),
            Some(json!({ "pdf_base64": BASE64.encode(&signed_pdf) })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["fully_valid"], true);
    assert_eq!(report["signatures"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["signatures"][0]["signer_name"], "Ada");

    // tamper with the document: the forged entry is invalid, the genuine
    // one stays valid, and the aggregate drops
    let mut forged_pdf = signed_pdf.clone();
    FakeCollaborator::forge_signature(&mut forged_pdf, "Mallory");

    let (_, report) = app
        .request(
            "POST",
            "/verify-signatures",
            Some(&token),
            Some(json!({ "pdf_base64": BASE64.encode(&forged_pdf) })),
        )
        .await?;
    assert_eq!(report["fully_valid"], false);
    let signatures = report["signatures"].as_array().unwrap();
    assert_eq!(signatures.len(), 2);
    let genuine = signatures.iter().find(|s| s["signer_name"] == "Ada").unwrap();
    let forged = signatures.iter().find(|s| s["signer_name"] == "Mallory").unwrap();
    assert_eq!(genuine["valid"], true);
    assert_eq!(forged["valid"], false);

    Ok(())
}

#[tokio::test]
async fn double_embedded_sign_is_rejected_with_one_row() -> Result<()> {
    let app = spawn_app().await?;
    let (token, _) = app
        .register("Ada", "ada@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&token, "sign-once", 2).await?;
    let cert = issue_certificate(&app, &token).await?;

    let (status, _, _, _) = sign_with_cert_raw(&app, &token, &doc, &cert).await?;
    assert_eq!(status, StatusCode::OK);

    // a second attempt by the same user is turned away before signing
    let (status, body, _, _) = sign_with_cert_raw(&app, &token, &doc, &cert).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(parsed["error"], "already_signed");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM document_signatures")
        .fetch_one(&app.pool)
        .await?;
    assert_eq!(count, 1);

    Ok(())
}

#[tokio::test]
async fn another_users_certificate_is_rejected() -> Result<()> {
    let app = spawn_app().await?;
    let (ada, _) = app
        .register("Ada", "ada@example.com", "operational_staff", Some("Legal"))
        .await?;
    let (grace, _) = app
        .register("Grace", "grace@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&grace, "wrong-cert", 1).await?;
    let ada_cert = issue_certificate(&app, &ada).await?;

    let (status, body, _, _) = sign_with_cert_raw(&app, &grace, &doc, &ada_cert).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let parsed: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(parsed["error"], "invalid_certificate");

    Ok(())
}
