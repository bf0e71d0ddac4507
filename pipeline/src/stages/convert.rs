//! Conversion and compilation stage.
//!
//! Materializes the Markdown into the run's scratch directory, converts it
//! to TeX, and attempts PDF compilation. Conversion failures trigger the
//! Markdown specialist group; tool-level failures (missing binary, timeout)
//! become leads rather than crashes, so the orchestrator can still report.

use std::fs;
use std::path::PathBuf;

use md_triage_core::{ContextSnippet, DiagnosticJob, JobOutcome, Lead, SourceKind};
use tracing::{info, warn};

use crate::error::Result;
use crate::scratch;
use crate::specialist::{ArtifactSet, DispatchMode, dispatch};
use crate::specialists::markdown_group;
use crate::tools::{self, ToolConfig, ToolStatus};

const STAGE: &str = "convert";

/// First bytes of the generated TeX that must contain `\documentclass` for
/// the output to count as structurally valid.
const TEX_VALIDATION_WINDOW: usize = 500;

pub fn run(job: DiagnosticJob) -> Result<DiagnosticJob> {
    run_with_config(job, &ToolConfig::from_env())
}

/// Stage body with an explicitly supplied tool configuration.
pub fn run_with_config(mut job: DiagnosticJob, config: &ToolConfig) -> Result<DiagnosticJob> {
    info!(case = %job.case_id, converter = %config.converter, "Starting conversion stage");

    // The entry point provisions the run scratch directory; a stage invoked
    // standalone falls back to a private one that lives for the stage.
    let mut stage_scratch: Option<tempfile::TempDir> = None;
    let base: PathBuf = match &job.scratch_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            dir.clone()
        }
        None => {
            let dir = tempfile::TempDir::with_prefix("md-triage-stage-")?;
            let path = dir.path().to_path_buf();
            stage_scratch = Some(dir);
            path
        }
    };

    let markdown_path = scratch::input_markdown_path(&base);
    let tex_path = scratch::generated_tex_path(&base);
    fs::write(&markdown_path, &job.markdown)?;

    job.conversion_attempted = true;
    let conversion = tools::run_converter(config, &markdown_path, &tex_path, &base);

    match conversion.status {
        ToolStatus::SpawnFailed(reason) => {
            warn!(case = %job.case_id, reason = %reason, "Converter could not be started");
            job.leads.push(tool_failure_lead(
                &config.converter,
                "markdown conversion",
                &reason,
            ));
            job.outcome = Some(JobOutcome::ToolFailure);
            return Ok(job);
        }
        ToolStatus::TimedOut => {
            job.leads.push(tool_failure_lead(
                &config.converter,
                "markdown conversion",
                &format!("timed out after {}s", config.timeout.as_secs()),
            ));
            job.conversion_log = Some(conversion.combined_log());
            job.outcome = Some(JobOutcome::ToolFailure);
            return Ok(job);
        }
        ToolStatus::Exited(code) => {
            job.conversion_log = Some(conversion.combined_log());
            if code != 0 {
                record_conversion_failure(&mut job);
                return Ok(job);
            }
        }
    }

    let tex = match fs::read_to_string(&tex_path) {
        Ok(tex) => tex,
        Err(error) => {
            warn!(case = %job.case_id, error = %error, "Converter exited cleanly but wrote no TeX");
            record_conversion_failure(&mut job);
            return Ok(job);
        }
    };

    let head = &tex[..tex.len().min(TEX_VALIDATION_WINDOW)];
    if !head.contains("\\documentclass") {
        warn!(case = %job.case_id, "Generated TeX is structurally invalid");
        job.generated_tex = Some(tex);
        record_conversion_failure(&mut job);
        return Ok(job);
    }

    job.conversion_succeeded = true;
    job.generated_tex = Some(tex);
    info!(case = %job.case_id, "Conversion succeeded; compiling");

    job.compilation_attempted = true;
    let compile = tools::run_compiler(config, &tex_path, &base);

    match compile.status {
        ToolStatus::SpawnFailed(reason) => {
            job.leads.push(tool_failure_lead(
                &config.compiler,
                "PDF compilation",
                &reason,
            ));
            job.outcome = Some(JobOutcome::ToolFailure);
            return Ok(job);
        }
        ToolStatus::TimedOut => {
            job.leads.push(tool_failure_lead(
                &config.compiler,
                "PDF compilation",
                &format!("timed out after {}s", config.timeout.as_secs()),
            ));
            job.compile_log = Some(compile.combined_log());
            job.outcome = Some(JobOutcome::ToolFailure);
            return Ok(job);
        }
        ToolStatus::Exited(code) => {
            // The on-disk log is richer than captured stdio; prefer it.
            let log_path = tools::compiler_log_path(&tex_path, &base);
            let log = fs::read_to_string(&log_path).unwrap_or_else(|_| compile.combined_log());
            job.compile_log = Some(log);

            let pdf_path = tools::output_pdf_path(&tex_path, &base);
            let pdf_ok = fs::metadata(&pdf_path).map(|meta| meta.len() > 0).unwrap_or(false);

            if code == 0 && pdf_ok {
                job.compilation_succeeded = true;
                job.outcome = Some(JobOutcome::Success);
                info!(case = %job.case_id, "Compilation succeeded");
            } else {
                job.outcome = Some(JobOutcome::CompilationFailed);
                info!(case = %job.case_id, code, "Compilation failed; leads pending investigation");
            }
        }
    }

    drop(stage_scratch);
    Ok(job)
}

/// Sweeps the Markdown specialist group after a conversion failure; when no
/// probe fires, one lead restating the failure keeps the record actionable.
fn record_conversion_failure(job: &mut DiagnosticJob) {
    job.conversion_succeeded = false;

    let artifacts = ArtifactSet {
        markdown: &job.markdown,
        generated_tex: job.generated_tex.as_deref(),
        compile_log: None,
    };
    let group = markdown_group();
    let mut leads = dispatch(&group, &artifacts, DispatchMode::FirstMatch, STAGE);

    if leads.is_empty() {
        let mut lead = Lead::new(STAGE, "Markdown could not be converted to TeX");
        if let Some(log) = job.conversion_log.as_deref().filter(|log| !log.trim().is_empty()) {
            lead = lead.with_snippet(ContextSnippet::new(SourceKind::ConversionLog, log));
        }
        leads.push(lead);
    }

    job.leads.extend(leads);
    job.outcome = Some(JobOutcome::ConversionFailed);
}

fn tool_failure_lead(program: &str, operation: &str, reason: &str) -> Lead {
    Lead::new(
        STAGE,
        &format!("The {operation} tool '{program}' failed: {reason}"),
    )
    .with_detail("tool", program)
    .with_detail("failure_reason", reason)
}
