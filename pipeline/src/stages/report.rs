//! Report assembly stage.
//!
//! Pure string assembly: the job's outcome, leads, and remedies are rendered
//! into the final human-readable report. This stage always populates
//! `final_report`, whatever path the job took through the pipeline.

use std::fmt::Write as _;

use md_triage_core::{ContextSnippet, DiagnosticJob, JobOutcome, Remedy};
use tracing::info;

use crate::error::{PipelineError, Result};

const RULE: &str = "============================================================";

pub fn run(mut job: DiagnosticJob) -> Result<DiagnosticJob> {
    let report = assemble(&job);
    info!(case = %job.case_id, bytes = report.len(), "Report assembled");
    job.final_report = Some(report);
    Ok(job)
}

fn assemble(job: &DiagnosticJob) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Markdown compile diagnosis — case {}", job.case_id);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Verdict: {}", verdict(job));

    match job.outcome {
        Some(JobOutcome::Success) => {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Your document converted to LaTeX and compiled to PDF without errors."
            );
        }
        Some(JobOutcome::NoActionableLeads) => {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "The compile failed, but none of the analyzers could pin down a cause."
            );
            let _ = writeln!(
                out,
                "Manual review of the compiler log below is recommended."
            );
            if let Some(log) = job.compile_log.as_deref().filter(|log| !log.trim().is_empty()) {
                let _ = writeln!(out);
                let _ = writeln!(out, "Compiler log (last lines):");
                for line in tail_lines(log, 15) {
                    let _ = writeln!(out, "    | {line}");
                }
            }
        }
        _ => {
            render_leads(&mut out, job);
            render_remedies(&mut out, job);
        }
    }

    out
}

fn verdict(job: &DiagnosticJob) -> &'static str {
    match job.outcome {
        Some(JobOutcome::Success) => "the document compiles cleanly",
        Some(JobOutcome::ConversionFailed) => "the Markdown could not be converted to LaTeX",
        Some(JobOutcome::CompilationFailed) | Some(JobOutcome::LeadsFound) => {
            "the generated LaTeX failed to compile"
        }
        Some(JobOutcome::RemediesProvided) => {
            "the document failed to compile; fixes are suggested below"
        }
        Some(JobOutcome::NoActionableLeads) => {
            "the compile failed for reasons the analyzers could not identify"
        }
        Some(JobOutcome::ToolFailure) => "an external tool failed before diagnosis could finish",
        Some(JobOutcome::InternalError) | None => "diagnosis ended without a conclusive outcome",
    }
}

fn render_leads(out: &mut String, job: &DiagnosticJob) {
    if job.leads.is_empty() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Issues found:");
    for (index, lead) in job.leads.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  {}. {}", index + 1, lead.description);
        for snippet in &lead.snippets {
            render_snippet(out, snippet);
        }
    }
}

fn render_remedies(out: &mut String, job: &DiagnosticJob) {
    if job.remedies.is_empty() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Suggested fixes:");
    let mut counter = 0usize;
    for (index, lead) in job.leads.iter().enumerate() {
        for remedy in job.remedies_for(&lead.id) {
            counter += 1;
            render_remedy(out, counter, index + 1, remedy);
        }
    }
    // Remedies whose lead is not in this job's collection cannot occur in a
    // validated record, but render orphans anyway rather than dropping them.
    for remedy in &job.remedies {
        if job.find_lead(&remedy.lead_id).is_none() {
            counter += 1;
            let _ = writeln!(out);
            let _ = writeln!(out, "  {counter}. {}", remedy.explanation);
            let _ = writeln!(out, "     Fix: {}", remedy.fix_instruction);
        }
    }
}

fn render_remedy(out: &mut String, number: usize, issue: usize, remedy: &Remedy) {
    let _ = writeln!(out);
    let _ = writeln!(out, "  {number}. (for issue {issue}) {}", remedy.explanation);
    let _ = writeln!(out, "     Fix: {}", remedy.fix_instruction);
    if let Some(snippet) = &remedy.markdown_context {
        let _ = writeln!(out, "     In your document:");
        for line in snippet.text.lines() {
            let _ = writeln!(out, "       | {line}");
        }
    }
    if let Some(after) = &remedy.suggested_fix {
        let _ = writeln!(out, "     After the fix:");
        for line in after.lines() {
            let _ = writeln!(out, "       | {line}");
        }
    }
    let _ = writeln!(out, "     Confidence: {}%", (remedy.confidence * 100.0).round());
}

fn render_snippet(out: &mut String, snippet: &ContextSnippet) {
    let location = match snippet.line {
        Some(line) => format!("{}, line {line}", snippet.source),
        None => snippet.source.to_string(),
    };
    let _ = writeln!(out, "     Evidence ({location}):");
    for line in snippet.text.lines() {
        let _ = writeln!(out, "       | {line}");
    }
    if let Some(notes) = &snippet.notes {
        let _ = writeln!(out, "       ({notes})");
    }
}

fn tail_lines(text: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].to_vec()
}

/// Best-effort report for a hard pipeline abort.
///
/// Distinct from a normal diagnosis: it tells the user the tool itself
/// malfunctioned rather than passing a verdict on their document.
pub fn internal_error_report(error: &PipelineError) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Markdown compile diagnosis — internal error");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "The diagnostic tool malfunctioned before it could finish analyzing"
    );
    let _ = writeln!(
        out,
        "your document. This is not a verdict on the document itself."
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Failure: {error}");
    if let Some(stderr) = error.worker_stderr().filter(|stderr| !stderr.trim().is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "Worker diagnostics:");
        for line in stderr.lines() {
            let _ = writeln!(out, "    | {line}");
        }
    }
    out
}
