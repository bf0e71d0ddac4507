//! Runaway-argument analysis of compiler logs.

use md_triage_core::{ContextSnippet, ErrorSignature, SOURCE_LINE_DETAIL_KEY, SourceKind};

use crate::specialist::{ArtifactSet, Finding, Specialist, SpecialistOutcome};

/// Detects `Runaway argument?` blocks, which usually mean a brace was opened
/// and never closed.
pub struct RunawayArgumentCheck;

impl Specialist for RunawayArgumentCheck {
    fn name(&self) -> &'static str {
        "runaway_argument"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let Some(log) = artifacts.compile_log else {
            return SpecialistOutcome::NoFinding;
        };

        let lines: Vec<&str> = log.lines().collect();
        let Some(index) = lines
            .iter()
            .position(|line| line.starts_with("Runaway argument?"))
        else {
            return SpecialistOutcome::NoFinding;
        };

        let runaway_text = lines
            .iter()
            .skip(index + 1)
            .find(|line| !line.trim().is_empty())
            .copied()
            .unwrap_or_default();
        let source_line = super::source_line_near(&lines, index, 10);
        let window_end = (index + 6).min(lines.len());

        let mut finding = Finding::new("Runaway argument: a group is opened but never closed")
            .with_signature(ErrorSignature::RunawayArgument)
            .with_snippet({
                let mut snippet = ContextSnippet::new(
                    SourceKind::CompileLog,
                    &lines[index..window_end].join("\n"),
                );
                if let Some(line) = source_line {
                    snippet = snippet.with_line(line);
                }
                snippet
            });
        if !runaway_text.trim().is_empty() {
            finding = finding.with_detail("runaway_text", runaway_text.trim());
        }
        if let Some(line) = source_line {
            finding = finding.with_detail(SOURCE_LINE_DETAIL_KEY, &line.to_string());
        }

        SpecialistOutcome::Finding(finding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_runaway_argument_block() {
        let log = "\
Runaway argument?
{never closed
! Paragraph ended before \\textbf was complete.
<to be read again>
l.3 \\textbf{never closed
";
        let artifacts = ArtifactSet {
            markdown: "",
            generated_tex: None,
            compile_log: Some(log),
        };
        let SpecialistOutcome::Finding(finding) = RunawayArgumentCheck.examine(&artifacts) else {
            panic!("expected a finding");
        };
        assert_eq!(
            finding.details.get("runaway_text").map(String::as_str),
            Some("{never closed")
        );
        assert_eq!(
            finding.details.get("source_line").map(String::as_str),
            Some("3")
        );
    }

    #[test]
    fn test_quiet_without_runaway_marker() {
        let artifacts = ArtifactSet {
            markdown: "",
            generated_tex: None,
            compile_log: Some("! Undefined control sequence.\n"),
        };
        assert!(matches!(
            RunawayArgumentCheck.examine(&artifacts),
            SpecialistOutcome::NoFinding
        ));
    }
}
