use crate::collaborator::Signer;
use crate::errors::AppResult;
use crate::models::VerifyResponse;

/// Check every signature embedded in `pdf`. Signer identity in the report
/// comes from the embedded certificates, not from request context; one bad
/// signature does not mask the others.
pub async fn verify_pdf(signer: &dyn Signer, pdf: &[u8]) -> AppResult<VerifyResponse> {
    let signatures = signer.verify_pdf(pdf).await?;
    let fully_valid = !signatures.is_empty()
        && signatures.iter().all(|s| s.valid && s.intact && s.trusted);

    Ok(VerifyResponse {
        signatures,
        fully_valid,
    })
}
