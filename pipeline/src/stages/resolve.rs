//! Remedy-mapping stage.
//!
//! Maps every recorded lead to one or more remedies via the remedy rule
//! table. Remedies inherit the lead's original-Markdown context snippet when
//! the mapper did not attach one of its own, so every fix points back at the
//! document the user actually edits.

use md_triage_core::{DiagnosticJob, JobOutcome, Remedy, SourceKind};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::remedy::map_lead;

const STAGE: &str = "resolve";

pub fn run(mut job: DiagnosticJob) -> Result<DiagnosticJob> {
    if job.leads.is_empty() {
        return Err(PipelineError::StageContract {
            stage: STAGE.to_string(),
            detail: "no leads to resolve".to_string(),
        });
    }

    info!(case = %job.case_id, leads = job.leads.len(), "Mapping leads to remedies");

    let mut remedies: Vec<Remedy> = Vec::new();
    for lead in &job.leads {
        let markdown_context = lead
            .snippets
            .iter()
            .find(|snippet| snippet.source == SourceKind::Markdown)
            .cloned();

        for mut remedy in map_lead(lead) {
            if remedy.markdown_context.is_none() {
                if let Some(context) = &markdown_context {
                    remedy.markdown_context = Some(context.clone());
                }
            }
            remedies.push(remedy);
        }
    }

    info!(case = %job.case_id, count = remedies.len(), "Remedy mapping complete");
    job.remedies.extend(remedies);
    job.outcome = Some(JobOutcome::RemediesProvided);
    Ok(job)
}
