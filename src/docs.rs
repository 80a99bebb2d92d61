//! OpenAPI document assembly. Handler annotations register the paths; this
//! module injects the bearer security scheme and the local server entry,
//! then serves the result next to Swagger UI.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::collaborator::SignatureReport;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::totp_setup,
        routes::auth::logout,
        routes::users::list_users,
        routes::users::update_user,
        routes::documents::create_document,
        routes::documents::list_documents,
        routes::documents::get_document,
        routes::documents::update_status,
        routes::documents::list_permissions,
        routes::documents::grant_permission,
        routes::documents::revoke_permission,
        routes::signatures::sign_document,
        routes::signatures::list_signatures,
        routes::signatures::sign_with_user_cert,
        routes::signatures::verify_signatures,
        routes::certificates::issue_certificate,
        routes::certificates::list_certificates,
        routes::rbac::list_role_permissions,
        routes::rbac::update_role_permission,
    ),
    components(
        schemas(
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::UserUpdateRequest,
            models::document::Document,
            models::document::DocumentStatus,
            models::document::DocumentCreateRequest,
            models::document::DocumentStatusRequest,
            models::document::DocumentStatusResponse,
            models::permission::DocumentPermission,
            models::permission::PermissionGrantRequest,
            models::signature::DocumentSignature,
            models::signature::SignRequest,
            models::signature::SignResponse,
            models::signature::SignWithCertificateRequest,
            models::signature::VerifyRequest,
            models::signature::VerifyResponse,
            models::certificate::UserCertificate,
            models::certificate::CertificateIssueRequest,
            models::certificate::CertificateIssueResponse,
            routes::auth::TotpSetupResponse,
            routes::rbac::RolePermissionEntry,
            crate::authz::Role,
            crate::authz::Capability,
            crate::authz::PermissionType,
            SignatureReport,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "User administration"),
        (name = "Documents", description = "Document lifecycle"),
        (name = "Permissions", description = "Per-document grants"),
        (name = "Signatures", description = "Signing and verification"),
        (name = "Certificates", description = "Signing credentials"),
        (name = "RBAC", description = "Role-permission administration")
    )
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

    ensure_security_components(&mut doc);
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

/// Serve the assembled JSON at a fixed path and mount Swagger UI against it.
pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn ensure_security_components(doc: &mut Value) {
    let components = doc
        .as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("components")
        .or_insert_with(|| json!({}));
    if let Some(components) = components.as_object_mut() {
        let schemes = components
            .entry("securitySchemes")
            .or_insert_with(|| json!({}));
        if let Some(schemes) = schemes.as_object_mut() {
            schemes.entry("bearerAuth").or_insert_with(|| {
                json!({ "type": "http", "scheme": "bearer", "bearerFormat": "JWT" })
            });
        }
    }
}

fn ensure_servers(doc: &mut Value, port: u16) {
    if doc.get("servers").is_none() {
        doc["servers"] = json!([{ "url": format!("http://localhost:{port}") }]);
    }
}
