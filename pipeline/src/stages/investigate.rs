//! Compile-log investigation stage.
//!
//! Runs the compile-log specialist group over the artifacts, with the
//! classification engine as catch-all, and anchors each lead in the
//! generated TeX when the compiler named a source line.

use md_triage_core::{
    DiagnosticJob, JobOutcome, Lead, SOURCE_LINE_DETAIL_KEY, SourceKind,
};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::specialist::{ArtifactSet, dispatch_with_fallback};
use crate::specialists::{compile_log_group, context_snippet_around};

const STAGE: &str = "investigate";

pub fn run(mut job: DiagnosticJob) -> Result<DiagnosticJob> {
    if !job.conversion_succeeded {
        return Err(contract_violation("conversion has not succeeded"));
    }
    if job.compilation_succeeded {
        return Err(contract_violation("compilation already succeeded"));
    }
    let Some(compile_log) = job.compile_log.clone() else {
        return Err(contract_violation("compile log is missing"));
    };

    info!(case = %job.case_id, "Starting investigation");

    let artifacts = ArtifactSet {
        markdown: &job.markdown,
        generated_tex: job.generated_tex.as_deref(),
        compile_log: Some(&compile_log),
    };
    let group = compile_log_group();
    let leads = dispatch_with_fallback(&group, &artifacts, STAGE);
    let leads: Vec<Lead> = leads
        .into_iter()
        .map(|lead| anchor_in_tex(lead, job.generated_tex.as_deref()))
        .collect();

    if leads.is_empty() {
        info!(case = %job.case_id, "No specialist produced a lead");
        job.outcome = Some(JobOutcome::NoActionableLeads);
    } else {
        info!(case = %job.case_id, count = leads.len(), "Investigation produced leads");
        job.leads.extend(leads);
        job.outcome = Some(JobOutcome::LeadsFound);
    }

    Ok(job)
}

/// Adds a generated-TeX context snippet to a lead whose analyzer located a
/// source line, unless one is already attached.
fn anchor_in_tex(lead: Lead, generated_tex: Option<&str>) -> Lead {
    let Some(tex) = generated_tex else {
        return lead;
    };
    let already_anchored = lead
        .snippets
        .iter()
        .any(|snippet| snippet.source == SourceKind::GeneratedTex);
    if already_anchored {
        return lead;
    }
    let Some(line) = lead
        .detail(SOURCE_LINE_DETAIL_KEY)
        .and_then(|raw| raw.parse::<u32>().ok())
    else {
        return lead;
    };
    match context_snippet_around(tex, SourceKind::GeneratedTex, line, 2) {
        Some(snippet) => lead.with_snippet(snippet),
        None => lead,
    }
}

fn contract_violation(detail: &str) -> PipelineError {
    PipelineError::StageContract {
        stage: STAGE.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_triage_core::SIGNATURE_DETAIL_KEY;

    fn investigable_job(compile_log: &str) -> DiagnosticJob {
        let mut job = DiagnosticJob::new("# doc\n\\badmacro{x}\n");
        job.conversion_attempted = true;
        job.conversion_succeeded = true;
        job.generated_tex = Some(
            "\\documentclass{article}\n\\begin{document}\n\\badmacro{x}\n\\end{document}\n"
                .to_string(),
        );
        job.compilation_attempted = true;
        job.compilation_succeeded = false;
        job.compile_log = Some(compile_log.to_string());
        job.outcome = Some(JobOutcome::CompilationFailed);
        job
    }

    #[test]
    fn test_undefined_command_log_yields_anchored_lead() {
        let log = "! Undefined control sequence.\nl.3 \\badmacro\n";
        let out = run(investigable_job(log)).unwrap();
        assert_eq!(out.outcome, Some(JobOutcome::LeadsFound));
        assert!(!out.leads.is_empty());
        let lead = &out.leads[0];
        assert_eq!(
            lead.detail(SIGNATURE_DETAIL_KEY),
            Some("undefined_control_sequence")
        );
        assert!(
            lead.snippets
                .iter()
                .any(|snippet| snippet.source == SourceKind::GeneratedTex)
        );
    }

    #[test]
    fn test_unrecognizable_log_yields_no_actionable_leads() {
        let log = "nothing that looks like an error\n";
        let out = run(investigable_job(log)).unwrap();
        assert_eq!(out.outcome, Some(JobOutcome::NoActionableLeads));
        assert!(out.leads.is_empty());
    }

    #[test]
    fn test_preconditions_are_contract_errors() {
        let mut job = DiagnosticJob::new("# doc\n");
        job.conversion_succeeded = false;
        assert!(matches!(
            run(job).unwrap_err(),
            PipelineError::StageContract { .. }
        ));

        let mut done = investigable_job("! boom\n");
        done.compilation_succeeded = true;
        assert!(matches!(
            run(done).unwrap_err(),
            PipelineError::StageContract { .. }
        ));

        let mut no_log = investigable_job("! boom\n");
        no_log.compile_log = None;
        assert!(matches!(
            run(no_log).unwrap_err(),
            PipelineError::StageContract { .. }
        ));
    }

    #[test]
    fn test_exotic_error_falls_back_to_classifier_lead() {
        let log = "! Interwoven alignment preambles are not allowed.\nl.8 &\n";
        let out = run(investigable_job(log)).unwrap();
        assert_eq!(out.outcome, Some(JobOutcome::LeadsFound));
        assert_eq!(out.leads.len(), 1);
        assert_eq!(out.leads[0].detail("analyzer"), Some("log_classifier"));
    }
}
