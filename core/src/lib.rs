//! Core job-record types, signature vocabulary, and validation for the
//! Markdown compile-diagnostics pipeline.

mod signature;
mod types;
mod validate;

pub use signature::{ErrorSignature, SIGNATURE_DETAIL_KEY, SOURCE_LINE_DETAIL_KEY};
pub use types::*;
pub use validate::{ValidationError, validate_job};
