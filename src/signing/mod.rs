//! The signing pipeline: eligibility checks and persistence (`recorder`),
//! threshold-driven document status (`lifecycle`), and embedded-signature
//! verification (`verify`).

pub mod lifecycle;
pub mod recorder;
pub mod verify;

pub use lifecycle::recompute_status;
pub use recorder::{has_signature, list_signatures, record_signature, RecordedSignature};
pub use verify::verify_pdf;
