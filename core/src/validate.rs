//! Structural validation of job records.
//!
//! Every job record that crosses a process boundary is validated here
//! before the orchestrator is allowed to act on it: required identity
//! fields, confidence ranges, snippet invariants, and remedy-to-lead
//! referential integrity.
//!
//! # Examples
//!
//! ```
//! use md_triage_core::{DiagnosticJob, Lead, validate_job};
//!
//! let mut job = DiagnosticJob::new("# doc\n");
//! job.leads.push(Lead::new("convert", "Conversion failed"));
//! assert!(validate_job(&job).is_empty());
//!
//! // Out-of-range confidence is rejected.
//! let mut bad = DiagnosticJob::new("# doc\n");
//! bad.leads.push(Lead::new("convert", "oops").with_confidence(1.5));
//! assert!(!validate_job(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{ContextSnippet, DiagnosticJob};

/// Job-record validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Case id is empty or whitespace-only.
    #[error("case id cannot be empty")]
    EmptyCaseId,
    /// The job carries no Markdown input.
    #[error("markdown input cannot be empty")]
    EmptyMarkdown,
    /// Two leads share the same id.
    #[error("duplicate lead id: {0}")]
    DuplicateLeadId(String),
    /// Two remedies share the same id.
    #[error("duplicate remedy id: {0}")]
    DuplicateRemedyId(String),
    /// A lead has an empty problem description.
    #[error("lead {0} has an empty description")]
    EmptyLeadDescription(String),
    /// A lead's confidence is outside `[0, 1]`.
    #[error("lead {0} confidence {1} is outside [0, 1]")]
    LeadConfidenceOutOfRange(String, f64),
    /// A remedy's confidence is outside `[0, 1]`.
    #[error("remedy {0} confidence {1} is outside [0, 1]")]
    RemedyConfidenceOutOfRange(String, f64),
    /// A snippet has empty excerpt text.
    #[error("snippet attached to {0} has empty text")]
    EmptySnippetText(String),
    /// A snippet carries a zero line number; lines are 1-based.
    #[error("snippet attached to {0} has line number 0")]
    SnippetLineZero(String),
    /// A remedy references a lead id that does not exist in the job.
    #[error("remedy {remedy_id} references unknown lead {lead_id}")]
    DanglingRemedyLead {
        /// Id of the offending remedy.
        remedy_id: String,
        /// The lead id that failed to resolve.
        lead_id: String,
    },
    /// A remedy has an empty explanation or fix instruction.
    #[error("remedy {0} is missing explanation or fix instruction")]
    IncompleteRemedy(String),
}

/// Validates the structural well-formedness of a job record.
///
/// Returns every violation found; an empty vector means the record is
/// structurally sound.
pub fn validate_job(job: &DiagnosticJob) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if job.case_id.trim().is_empty() {
        errors.push(ValidationError::EmptyCaseId);
    }
    if job.markdown.is_empty() {
        errors.push(ValidationError::EmptyMarkdown);
    }

    let mut lead_ids: HashSet<&str> = HashSet::new();
    for lead in &job.leads {
        if !lead_ids.insert(lead.id.as_str()) {
            errors.push(ValidationError::DuplicateLeadId(lead.id.clone()));
        }
        if lead.description.trim().is_empty() {
            errors.push(ValidationError::EmptyLeadDescription(lead.id.clone()));
        }
        if !(0.0..=1.0).contains(&lead.confidence) {
            errors.push(ValidationError::LeadConfidenceOutOfRange(
                lead.id.clone(),
                lead.confidence,
            ));
        }
        for snippet in &lead.snippets {
            errors.extend(validate_snippet(snippet, &lead.id));
        }
    }

    let mut remedy_ids: HashSet<&str> = HashSet::new();
    for remedy in &job.remedies {
        if !remedy_ids.insert(remedy.id.as_str()) {
            errors.push(ValidationError::DuplicateRemedyId(remedy.id.clone()));
        }
        if !lead_ids.contains(remedy.lead_id.as_str()) {
            errors.push(ValidationError::DanglingRemedyLead {
                remedy_id: remedy.id.clone(),
                lead_id: remedy.lead_id.clone(),
            });
        }
        if remedy.explanation.trim().is_empty() || remedy.fix_instruction.trim().is_empty() {
            errors.push(ValidationError::IncompleteRemedy(remedy.id.clone()));
        }
        if !(0.0..=1.0).contains(&remedy.confidence) {
            errors.push(ValidationError::RemedyConfidenceOutOfRange(
                remedy.id.clone(),
                remedy.confidence,
            ));
        }
        if let Some(snippet) = &remedy.markdown_context {
            errors.extend(validate_snippet(snippet, &remedy.id));
        }
    }

    errors
}

fn validate_snippet(snippet: &ContextSnippet, owner_id: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if snippet.text.trim().is_empty() {
        errors.push(ValidationError::EmptySnippetText(owner_id.to_string()));
    }
    if snippet.line == Some(0) {
        errors.push(ValidationError::SnippetLineZero(owner_id.to_string()));
    }
    errors
}
