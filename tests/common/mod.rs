use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt; // for `oneshot`

use firmas::authz::RolePermissionCache;
use firmas::collaborator::FakeCollaborator;
use firmas::events;
use firmas::jwt::JwtConfig;
use firmas::storage::LocalArtifactStore;
use firmas::{create_app_with, AppState};

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub fake: Arc<FakeCollaborator>,
    _dir: TempDir,
}

pub async fn spawn_app() -> Result<TestApp> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let jwt = JwtConfig::from_env().map_err(|err| anyhow::anyhow!(err.to_string()))?;

    let (event_bus, event_rx) = events::init_event_bus();
    tokio::spawn(events::start_activity_listener(event_rx, pool.clone()));

    let fake = Arc::new(FakeCollaborator::new());
    let state = AppState {
        pool: pool.clone(),
        jwt: Arc::new(jwt),
        role_cache: Arc::new(RolePermissionCache::with_system_clock(Duration::from_secs(300))),
        issuer: fake.clone(),
        signer: fake.clone(),
        store: Arc::new(LocalArtifactStore::new(dir.path().join("artifacts"))),
        event_bus,
    };

    Ok(TestApp {
        app: create_app_with(state),
        pool,
        fake,
        _dir: dir,
    })
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        Ok((status, value))
    }

    /// Register a user and return the bearer token and user id.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        role: &str,
        department: Option<&str>,
    ) -> Result<(String, String)> {
        let (status, body) = self
            .request(
                "POST",
                "/auth/register",
                None,
                Some(json!({
                    "name": name,
                    "email": email,
                    "password": "password123",
                    "role": role,
                    "department": department,
                })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {status} {body}");

        let token = body["token"].as_str().context("missing token")?.to_string();
        let user_id = body["user"]["id"].as_str().context("missing user id")?.to_string();
        Ok((token, user_id))
    }

    /// Create a document owned by the holder of `token`.
    pub async fn create_document(
        &self,
        token: &str,
        title: &str,
        requires_signatures: i64,
    ) -> Result<String> {
        let (status, body) = self
            .request(
                "POST",
                "/documents",
                Some(token),
                Some(json!({
                    "title": title,
                    "storage_path": format!("uploads/{title}.pdf"),
                    "requires_signatures": requires_signatures,
                })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create document failed: {status} {body}");
        Ok(body["id"].as_str().context("missing document id")?.to_string())
    }

    pub async fn grant(
        &self,
        token: &str,
        document_id: &str,
        user_id: &str,
        permission_type: &str,
    ) -> Result<(StatusCode, Value)> {
        self.request(
            "POST",
            &format!("/documents/{document_id}/permissions"),
            Some(token),
            Some(json!({ "user_id": user_id, "permission_type": permission_type })),
        )
        .await
    }

    pub async fn sign(
        &self,
        token: &str,
        document_id: &str,
        reason: &str,
    ) -> Result<(StatusCode, Value)> {
        self.request(
            "POST",
            &format!("/documents/{document_id}/sign"),
            Some(token),
            Some(json!({ "reason": reason })),
        )
        .await
    }
}
