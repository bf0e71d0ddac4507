//! Specialist dispatch.
//!
//! A specialist is an independent analyzer probing one failure class. The
//! dispatcher runs an ordered list of specialists against a shared artifact
//! set and merges their findings into leads. A specialist's internal failure
//! is caught at this boundary and treated as "no finding"; it never aborts
//! the sweep.

use std::collections::BTreeMap;

use md_triage_core::{
    ContextSnippet, ErrorSignature, Lead, SIGNATURE_DETAIL_KEY, SOURCE_LINE_DETAIL_KEY,
};
use tracing::{debug, warn};

use crate::classify::classify_log;

/// The artifacts every specialist may inspect.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactSet<'a> {
    /// The original Markdown document.
    pub markdown: &'a str,
    /// The generated TeX intermediate, once conversion has succeeded.
    pub generated_tex: Option<&'a str>,
    /// The TeX compiler log, once compilation has been attempted.
    pub compile_log: Option<&'a str>,
}

/// One structured finding from a specialist.
#[derive(Debug, Clone)]
pub struct Finding {
    /// Human-readable problem statement.
    pub description: String,
    /// Evidence snippets.
    pub snippets: Vec<ContextSnippet>,
    /// Analyzer-private details handed to the remedy mapper.
    pub details: BTreeMap<String, String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Finding {
    /// Creates a finding with full confidence and no evidence yet.
    pub fn new(description: &str) -> Self {
        Self {
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

    /// Records the classified signature in the detail bag.
    pub fn with_signature(mut self, signature: ErrorSignature) -> Self {
        self.details
            .insert(SIGNATURE_DETAIL_KEY.to_string(), signature.as_str().to_string());
        self
    }

    /// Records an arbitrary detail.
    pub fn with_detail(mut self, key: &str, value: &str) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the confidence score.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Tagged result of one specialist invocation.
///
/// The explicit `Failure` variant keeps the merge logic exhaustively
/// checked instead of inspecting error types at runtime.
#[derive(Debug, Clone)]
pub enum SpecialistOutcome {
    /// The specialist identified exactly one problem.
    Finding(Finding),
    /// The specialist ran cleanly and found nothing.
    NoFinding,
    /// The specialist could not complete its analysis.
    Failure(String),
}

/// An independent analyzer probing one failure class.
pub trait Specialist {
    /// Stable analyzer name, recorded on every lead it produces.
    fn name(&self) -> &'static str;

    /// Examines the artifact set, returning zero or one finding.
    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome;
}

/// How a specialist group is swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Stop at the first specialist that returns a finding. Used when the
    /// specialists are redundant probes for the same failure class.
    FirstMatch,
    /// Invoke every specialist, accumulating every finding. Used when the
    /// specialists probe disjoint failure classes.
    RunAll,
}

/// Runs the given specialists in order and merges findings into leads.
///
/// Specialists run strictly sequentially. A `Failure` outcome is logged and
/// treated as "no finding".
pub fn dispatch(
    specialists: &[Box<dyn Specialist>],
    artifacts: &ArtifactSet<'_>,
    mode: DispatchMode,
    source_stage: &str,
) -> Vec<Lead> {
    let mut leads = Vec::new();

    for specialist in specialists {
        match specialist.examine(artifacts) {
            SpecialistOutcome::Finding(finding) => {
                debug!(
                    specialist = specialist.name(),
                    description = %finding.description,
                    "Specialist produced a finding"
                );
                leads.push(finding_to_lead(finding, specialist.name(), source_stage));
                if mode == DispatchMode::FirstMatch {
                    break;
                }
            }
            SpecialistOutcome::NoFinding => {
                debug!(specialist = specialist.name(), "Specialist found nothing");
            }
            SpecialistOutcome::Failure(reason) => {
                warn!(
                    specialist = specialist.name(),
                    reason = %reason,
                    "Specialist failed; treating as no finding"
                );
            }
        }
    }

    leads
}

/// Runs a run-all specialist group with the classification engine as a
/// catch-all: when no specialist produces a finding, the compiler log is
/// classified directly and any actionable signature becomes one lead.
pub fn dispatch_with_fallback(
    specialists: &[Box<dyn Specialist>],
    artifacts: &ArtifactSet<'_>,
    source_stage: &str,
) -> Vec<Lead> {
    let leads = dispatch(specialists, artifacts, DispatchMode::RunAll, source_stage);
    if !leads.is_empty() {
        return leads;
    }

    let Some(log) = artifacts.compile_log else {
        return leads;
    };

    let classification = classify_log(log);
    if !classification.signature.is_actionable() {
        return leads;
    }

    debug!(
        signature = %classification.signature,
        "No specialist finding; falling back to log classification"
    );

    let description = classification
        .raw_error
        .clone()
        .unwrap_or_else(|| "Compiler reported an error".to_string());
    let mut finding = Finding::new(&description)
        .with_signature(classification.signature)
        .with_snippet({
            let mut snippet = ContextSnippet::new(
                md_triage_core::SourceKind::CompileLog,
                &classification.excerpt,
            );
            if let Some(line) = classification.source_line {
                snippet = snippet
                    .with_notes(&format!("compiler points at TeX source line {line}"));
            }
            snippet
        });
    if let Some(line) = classification.source_line {
        finding = finding.with_detail(SOURCE_LINE_DETAIL_KEY, &line.to_string());
    }

    vec![finding_to_lead(finding, "log_classifier", source_stage)]
}

fn finding_to_lead(finding: Finding, analyzer: &str, source_stage: &str) -> Lead {
    let mut lead = Lead::new(source_stage, &finding.description)
        .with_confidence(finding.confidence)
        .with_detail("analyzer", analyzer);
    for snippet in finding.snippets {
        lead = lead.with_snippet(snippet);
    }
    for (key, value) in finding.details {
        lead = lead.with_detail(&key, &value);
    }
    lead
}
