//! Job-record type definitions for the diagnostic pipeline.
//!
//! This module defines the data model that flows through every pipeline
//! stage. The types are designed for serialization with [`serde`] so a
//! [`DiagnosticJob`] can round-trip through JSON between isolated stage
//! processes without losing information.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which document a [`ContextSnippet`] was taken from.
///
/// Line numbers inside a snippet are only meaningful relative to this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The user's original Markdown document.
    Markdown,
    /// The TeX intermediate produced by the converter.
    GeneratedTex,
    /// Raw output captured from the Markdown-to-TeX converter.
    ConversionLog,
    /// The TeX compiler's log file.
    CompileLog,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::GeneratedTex => write!(f, "generated_tex"),
            Self::ConversionLog => write!(f, "conversion_log"),
            Self::CompileLog => write!(f, "compile_log"),
        }
    }
}

/// A located excerpt from a source document or tool log.
///
/// Snippets pinpoint the evidence for a [`Lead`] or show the area of the
/// original document a [`Remedy`] wants changed.
///
/// # Examples
///
/// ```
/// use md_triage_core::{ContextSnippet, SourceKind};
///
/// let snippet = ContextSnippet::new(SourceKind::GeneratedTex, "\\badcommand{x}")
///     .with_line(42)
///     .with_notes("undefined command used here");
/// assert_eq!(snippet.line, Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    /// Document kind this snippet was taken from.
    pub source: SourceKind,
    /// 1-based line number of the point of interest, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// The excerpt text, possibly multi-line.
    pub text: String,
    /// Free-form location detail (a section title, a character offset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_detail: Option<String>,
    /// Annotations explaining why the snippet is relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ContextSnippet {
    /// Creates a snippet with the given source kind and text.
    pub fn new(source: SourceKind, text: &str) -> Self {
        Self {
            source,
            line: None,
            text: text.to_string(),
            location_detail: None,
            notes: None,
        }
    }

    /// Sets the 1-based central line number.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Adds a free-form location detail.
    pub fn with_location_detail(mut self, detail: &str) -> Self {
        self.location_detail = Some(detail.to_string());
        self
    }

    /// Adds annotation notes.
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}

/// One diagnosed problem, reported by a stage or one of its analyzers.
///
/// Leads are append-only: once created they are never mutated, and stages
/// only ever add them to a job's `leads` collection.
///
/// # Examples
///
/// ```
/// use md_triage_core::{ContextSnippet, Lead, SourceKind};
///
/// let lead = Lead::new("investigate", "Undefined control sequence")
///     .with_snippet(ContextSnippet::new(SourceKind::CompileLog, "! Undefined control sequence."))
///     .with_detail("error_signature", "undefined_control_sequence");
/// assert!(lead.id.starts_with("lead-"));
/// assert_eq!(lead.confidence, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier for this lead.
    pub id: String,
    /// Name of the stage or analyzer that produced the lead.
    pub source_stage: String,
    /// Short human-readable description of the problem.
    pub description: String,
    /// Evidence snippets illustrating the problem.
    #[serde(default)]
    pub snippets: Vec<ContextSnippet>,
    /// Analyzer-private details consumed by the remedy mapper.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
    /// Confidence that this lead describes a real problem, in `[0, 1]`.
    pub confidence: f64,
}

impl Lead {
    /// Creates a lead with a fresh id and full confidence.
    pub fn new(source_stage: &str, description: &str) -> Self {
        Self {
            id: new_id("lead"),
            source_stage: source_stage.to_string(),
            description: description.to_string(),
            snippets: Vec::new(),
            details: BTreeMap::new(),
            confidence: 1.0,
        }
    }

    /// Attaches an evidence snippet.
    pub fn with_snippet(mut self, snippet: ContextSnippet) -> Self {
        self.snippets.push(snippet);
        self
    }

    /// Records an analyzer-private detail.
    pub fn with_detail(mut self, key: &str, value: &str) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the confidence score.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Returns a detail value by key, if present.
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

/// One proposed fix, always expressed against the original Markdown.
///
/// # Examples
///
/// ```
/// use md_triage_core::{Lead, Remedy};
///
/// let lead = Lead::new("investigate", "Missing $ inserted");
/// let remedy = Remedy::new(
///     &lead.id,
///     "resolve",
///     "A math expression is missing its delimiters.",
///     "Wrap the expression in '$ ... $'.",
/// );
/// assert_eq!(remedy.lead_id, lead.id);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remedy {
    /// Unique identifier for this remedy.
    pub id: String,
    /// Id of the lead this remedy addresses.
    pub lead_id: String,
    /// Name of the stage that proposed the remedy.
    pub source_stage: String,
    /// Why the problem occurs and how the fix resolves it.
    pub explanation: String,
    /// Concrete instruction for changing the original Markdown.
    pub fix_instruction: String,
    /// Area of the original Markdown to modify, when locatable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_context: Option<ContextSnippet>,
    /// What the relevant Markdown should look like after the fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// Confidence that this remedy resolves the lead, in `[0, 1]`.
    pub confidence: f64,
}

impl Remedy {
    /// Creates a remedy with a fresh id and full confidence.
    pub fn new(
        lead_id: &str,
        source_stage: &str,
        explanation: &str,
        fix_instruction: &str,
    ) -> Self {
        Self {
            id: new_id("remedy"),
            lead_id: lead_id.to_string(),
            source_stage: source_stage.to_string(),
            explanation: explanation.to_string(),
            fix_instruction: fix_instruction.to_string(),
            markdown_context: None,
            suggested_fix: None,
            confidence: 1.0,
        }
    }

    /// Attaches a Markdown context snippet.
    pub fn with_markdown_context(mut self, snippet: ContextSnippet) -> Self {
        self.markdown_context = Some(snippet);
        self
    }

    /// Sets the post-fix text sample.
    pub fn with_suggested_fix(mut self, suggested: &str) -> Self {
        self.suggested_fix = Some(suggested.to_string());
        self
    }

    /// Sets the confidence score.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Overall outcome of a diagnostic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Conversion and compilation both succeeded.
    Success,
    /// The Markdown-to-TeX conversion failed.
    ConversionFailed,
    /// The TeX-to-PDF compilation failed; investigation pending.
    CompilationFailed,
    /// Investigation produced at least one lead.
    LeadsFound,
    /// Remedies were mapped for the recorded leads.
    RemediesProvided,
    /// A failure occurred but no analyzer produced a lead; manual review.
    NoActionableLeads,
    /// An external tool was missing, timed out, or misbehaved.
    ToolFailure,
    /// The pipeline itself malfunctioned.
    InternalError,
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::ConversionFailed => "conversion_failed",
            Self::CompilationFailed => "compilation_failed",
            Self::LeadsFound => "leads_found",
            Self::RemediesProvided => "remedies_provided",
            Self::NoActionableLeads => "no_actionable_leads",
            Self::ToolFailure => "tool_failure",
            Self::InternalError => "internal_error",
        };
        write!(f, "{label}")
    }
}

/// High-level pipeline position of a job.
///
/// Only the orchestrator transitions this marker; stages read it but never
/// write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Freshly created by the entry point.
    #[default]
    Intake,
    /// Conversion and compilation attempt.
    Convert,
    /// Compile-log investigation.
    Investigate,
    /// Remedy mapping.
    Resolve,
    /// Report assembly.
    Report,
    /// Report produced; the job is terminal.
    Complete,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Intake => "intake",
            Self::Convert => "convert",
            Self::Investigate => "investigate",
            Self::Resolve => "resolve",
            Self::Report => "report",
            Self::Complete => "complete",
        };
        write!(f, "{label}")
    }
}

/// The evolving record for a single diagnostic run.
///
/// A job is created once by the entry point with only the input populated,
/// mutated by exactly one stage at a time, and terminated when the report
/// stage fills in `final_report`. Success flags, once set by their owning
/// stage, are read-only for later stages.
///
/// # Examples
///
/// ```
/// use md_triage_core::{DiagnosticJob, PipelineStage};
///
/// let job = DiagnosticJob::new("# Title\n\nSome text.\n");
/// assert!(!job.case_id.is_empty());
/// assert_eq!(job.pipeline_stage, PipelineStage::Intake);
/// assert!(!job.conversion_attempted);
/// assert!(job.leads.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticJob {
    /// Unique identifier for this diagnostic case.
    pub case_id: String,
    /// UTC creation timestamp, ISO 8601 with second precision.
    pub created_at: String,
    /// Full content of the Markdown document under diagnosis.
    pub markdown: String,
    /// Per-run scratch directory shared by the stages, when provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Whether a Markdown-to-TeX conversion was attempted.
    #[serde(default)]
    pub conversion_attempted: bool,
    /// Whether the conversion produced structurally valid TeX.
    #[serde(default)]
    pub conversion_succeeded: bool,
    /// Verbatim converter output (stdout and stderr).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_log: Option<String>,
    /// The generated TeX, present once conversion succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_tex: Option<String>,

    /// Whether a TeX-to-PDF compilation was attempted.
    #[serde(default)]
    pub compilation_attempted: bool,
    /// Whether compilation produced a valid, non-empty PDF.
    #[serde(default)]
    pub compilation_succeeded: bool,
    /// Verbatim compiler log file content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_log: Option<String>,

    /// Problems found so far, in discovery order.
    #[serde(default)]
    pub leads: Vec<Lead>,
    /// Proposed fixes, in mapping order.
    #[serde(default)]
    pub remedies: Vec<Remedy>,

    /// Current pipeline position, owned by the orchestrator.
    #[serde(default)]
    pub pipeline_stage: PipelineStage,
    /// Overall outcome, set as processing concludes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    /// The assembled human-readable report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<String>,
}

impl DiagnosticJob {
    /// Creates a fresh job for the given Markdown content.
    pub fn new(markdown: &str) -> Self {
        Self {
            case_id: Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            markdown: markdown.to_string(),
            scratch_dir: None,
            conversion_attempted: false,
            conversion_succeeded: false,
            conversion_log: None,
            generated_tex: None,
            compilation_attempted: false,
            compilation_succeeded: false,
            compile_log: None,
            leads: Vec::new(),
            remedies: Vec::new(),
            pipeline_stage: PipelineStage::Intake,
            outcome: None,
            final_report: None,
        }
    }

    /// Looks up a lead by id.
    pub fn find_lead(&self, id: &str) -> Option<&Lead> {
        self.leads.iter().find(|lead| lead.id == id)
    }

    /// Returns the remedies addressing the given lead.
    pub fn remedies_for(&self, lead_id: &str) -> Vec<&Remedy> {
        self.remedies
            .iter()
            .filter(|remedy| remedy.lead_id == lead_id)
            .collect()
    }
}

fn new_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &hex[..8])
}
