use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::RolePermissionCache;
use crate::collaborator::{CertificateIssuer, ProcessCollaborator, Signer};
use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, certificates, documents, health, rbac, signatures, users};
use crate::storage::{ArtifactStore, LocalArtifactStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub role_cache: Arc<RolePermissionCache>,
    pub issuer: Arc<dyn CertificateIssuer>,
    pub signer: Arc<dyn Signer>,
    pub store: Arc<dyn ArtifactStore>,
    pub event_bus: EventBus,
}

/// Production wiring: collaborators and artifact root from the environment,
/// activity listener spawned on the current runtime.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, event_rx) = events::init_event_bus();
    tokio::spawn(events::start_activity_listener(event_rx, pool.clone()));

    let collaborator = Arc::new(ProcessCollaborator::from_env());
    let state = AppState {
        pool,
        jwt: Arc::new(jwt_config),
        role_cache: Arc::new(RolePermissionCache::with_system_clock(
            RolePermissionCache::DEFAULT_TTL,
        )),
        issuer: collaborator.clone(),
        signer: collaborator,
        store: Arc::new(LocalArtifactStore::from_env()),
        event_bus,
    };

    Ok(create_app_with(state))
}

/// Build the router from an explicit state; tests inject fake collaborators
/// and a tempdir-backed artifact store through this.
pub fn create_app_with(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/totp/setup", post(auth::totp_setup))
        .route("/logout", post(auth::logout));

    let document_routes = Router::new()
        .route("/", get(documents::list_documents))
        .route("/", post(documents::create_document))
        .route("/:id", get(documents::get_document))
        .route("/:id/status", put(documents::update_status))
        .route("/:id/permissions", get(documents::list_permissions))
        .route("/:id/permissions", post(documents::grant_permission))
        .route(
            "/:id/permissions/:permission_id",
            delete(documents::revoke_permission),
        )
        .route("/:id/sign", post(signatures::sign_document))
        .route("/:id/signatures", get(signatures::list_signatures));

    let certificate_routes = Router::new()
        .route("/", get(certificates::list_certificates))
        .route("/", post(certificates::issue_certificate));

    let rbac_routes = Router::new()
        .route("/role-permissions", get(rbac::list_role_permissions))
        .route("/role-permissions", put(rbac::update_role_permission));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id", put(users::update_user));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/documents", document_routes)
        .nest("/certificates", certificate_routes)
        .nest("/rbac", rbac_routes)
        .nest("/users", user_routes)
        .route("/sign-with-user-cert", post(signatures::sign_with_user_cert))
        .route("/verify-signatures", post(signatures::verify_signatures))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
