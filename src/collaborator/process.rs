use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tokio::process::Command;

use super::{
    CertificateIssuer, CollaboratorError, CertificateInfo, IssueRequest, IssuedCertificate,
    SignPdfRequest, SignatureReport, SignedPdf, Signer,
};

/// Production collaborator: spawns the configured command once per request
/// and parses a single JSON document from stdout. No retries; failures are
/// surfaced to the caller unmodified.
#[derive(Debug, Clone)]
pub struct ProcessCollaborator {
    program: String,
    base_args: Vec<String>,
}

impl ProcessCollaborator {
    /// `command` is the full invocation prefix, e.g.
    /// `python3 scripts/signature_manager.py`.
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_else(|| "python3".to_string());
        Self {
            program,
            base_args: parts.collect(),
        }
    }

    pub fn from_env() -> Self {
        let command = std::env::var("SIGNER_COMMAND")
            .unwrap_or_else(|_| "python3 scripts/signature_manager.py".to_string());
        Self::new(&command)
    }

    async fn run(&self, args: &[(&str, &str)]) -> Result<Value, CollaboratorError> {
        let mut command = Command::new(&self.program);
        command.args(&self.base_args);
        for (flag, value) in args {
            command.arg(flag).arg(value);
        }

        let output = command.output().await?;

        if !output.status.success() {
            return Err(CollaboratorError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim())
            .map_err(|err| CollaboratorError::MalformedOutput(format!("{err}: {stdout}")))?;

        // An {"error": ...} object is a failure even on exit code 0.
        if let Some(message) = parsed.get("error").and_then(Value::as_str) {
            return Err(CollaboratorError::Reported(message.to_string()));
        }

        Ok(parsed)
    }
}

fn decode_field(value: &Value, field: &str) -> Result<Vec<u8>, CollaboratorError> {
    let encoded = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| CollaboratorError::MalformedOutput(format!("missing {field}")))?;
    BASE64
        .decode(encoded)
        .map_err(|err| CollaboratorError::MalformedOutput(format!("invalid base64 in {field}: {err}")))
}

#[async_trait]
impl CertificateIssuer for ProcessCollaborator {
    async fn generate(&self, request: &IssueRequest) -> Result<IssuedCertificate, CollaboratorError> {
        let days = request.days_valid.to_string();
        let value = self
            .run(&[
                ("--action", "generate_certificate"),
                ("--user_name", &request.user_name),
                ("--email", &request.email),
                ("--country_name", &request.country),
                ("--org_name", &request.organization),
                ("--org_unit_name", &request.organizational_unit),
                ("--days_valid", &days),
            ])
            .await?;

        let certificate_pem = decode_field(&value, "certificate_pem_base64")?;
        let private_key_pem = decode_field(&value, "private_key_pem_base64")?;
        let info = value
            .get("certificate_info")
            .and_then(|v| serde_json::from_value::<CertificateInfo>(v.clone()).ok());

        Ok(IssuedCertificate {
            certificate_pem,
            private_key_pem,
            info,
        })
    }
}

#[async_trait]
impl Signer for ProcessCollaborator {
    async fn sign_pdf(&self, request: &SignPdfRequest) -> Result<SignedPdf, CollaboratorError> {
        let pdf_b64 = BASE64.encode(&request.pdf);
        let cert_b64 = BASE64.encode(&request.certificate_pem);
        let key_b64 = BASE64.encode(&request.private_key_pem);

        let value = self
            .run(&[
                ("--action", "sign_pdf"),
                ("--pdf_base64", &pdf_b64),
                ("--cert_base64", &cert_b64),
                ("--key_base64", &key_b64),
                ("--user_name", &request.signer_name),
                ("--reason", &request.reason),
            ])
            .await?;

        let pdf = decode_field(&value, "signed_pdf_base64")?;
        let signature_hash = value
            .get("signature_hash")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| crate::utils::sha256_hex(&pdf));

        Ok(SignedPdf { pdf, signature_hash })
    }

    async fn verify_pdf(&self, pdf: &[u8]) -> Result<Vec<SignatureReport>, CollaboratorError> {
        let pdf_b64 = BASE64.encode(pdf);
        let value = self.run(&[("--action", "verify"), ("--pdf_base64", &pdf_b64)]).await?;

        // The verify action emits either a bare array or {"signatures": [...]}.
        let reports = if value.is_array() {
            value
        } else if let Some(list) = value.get("signatures") {
            list.clone()
        } else {
            return Err(CollaboratorError::MalformedOutput(
                "verify output has no signature list".to_string(),
            ));
        };

        serde_json::from_value(reports)
            .map_err(|err| CollaboratorError::MalformedOutput(err.to_string()))
    }
}
