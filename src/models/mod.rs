pub mod certificate;
pub mod document;
pub mod permission;
pub mod signature;
pub mod user;

pub use certificate::{
    CertificateIssueRequest, CertificateIssueResponse, DbUserCertificate, UserCertificate,
};
pub use document::{
    DbDocument, Document, DocumentCreateRequest, DocumentStatus, DocumentStatusRequest,
    DocumentStatusResponse,
};
pub use permission::{DbDocumentPermission, DocumentPermission, PermissionGrantRequest};
pub use signature::{
    DbDocumentSignature, DocumentSignature, SignRequest, SignResponse, SignWithCertificateRequest,
    VerifyRequest, VerifyResponse,
};
pub use user::{AuthResponse, DbUser, LoginRequest, RegisterRequest, User, UserUpdateRequest};
