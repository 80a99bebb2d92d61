//! The audit trail: domain actions project into activity_log and the
//! hash-chained event_store.

mod common;

use anyhow::Result;
use std::time::Duration;

use common::spawn_app;

#[tokio::test]
async fn signing_flow_leaves_an_audit_trail() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&owner, "audited", 1).await?;
    app.sign(&owner, &doc, "audited signature").await?;

    // the listener is async; give it a moment to drain the bus
    tokio::time::sleep(Duration::from_millis(200)).await;

    let names: Vec<String> = sqlx::query_scalar("SELECT event_name FROM activity_log ORDER BY occurred_at")
        .fetch_all(&app.pool)
        .await?;

    assert!(names.iter().any(|n| n == "user.registered"));
    assert!(names.iter().any(|n| n == "document.created"));
    assert!(names.iter().any(|n| n == "document_signature.signed"));

    Ok(())
}

#[tokio::test]
async fn event_store_rows_chain_their_hashes() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    app.create_document(&owner, "chained", 1).await?;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let rows: Vec<(Option<String>, String)> =
        sqlx::query_as("SELECT prev_hash, hash FROM event_store ORDER BY created_at, rowid")
            .fetch_all(&app.pool)
            .await?;
    assert!(rows.len() >= 2);

    // first row has no predecessor; every later row points at the one before
    assert!(rows[0].0.is_none());
    for pair in rows.windows(2) {
        assert_eq!(pair[1].0.as_deref(), Some(pair[0].1.as_str()));
    }

    Ok(())
}

#[tokio::test]
async fn signature_events_are_critical_severity() -> Result<()> {
    let app = spawn_app().await?;

    let (owner, _) = app
        .register("Owner", "owner@example.com", "operational_staff", Some("Legal"))
        .await?;
    let doc = app.create_document(&owner, "severity-check", 1).await?;
    app.sign(&owner, &doc, "critical action").await?;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let severity: String = sqlx::query_scalar(
        "SELECT severity FROM activity_log WHERE event_name = 'document_signature.signed'",
    )
    .fetch_one(&app.pool)
    .await?;
    assert_eq!(severity, "critical");

    Ok(())
}
