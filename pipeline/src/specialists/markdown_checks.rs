//! Markdown-side checks used when the conversion itself fails.
//!
//! These are redundant probes for the same failure class (structurally
//! broken Markdown), so callers sweep them first-match.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use md_triage_core::{ContextSnippet, ErrorSignature, SourceKind};
use regex::Regex;

use crate::specialist::{ArtifactSet, Finding, Specialist, SpecialistOutcome};

/// Flags an odd number of code-fence markers.
pub struct CodeFenceCheck;

impl Specialist for CodeFenceCheck {
    fn name(&self) -> &'static str {
        "code_fence"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let mut last_fence_line = 0u32;
        let mut fence_count = 0usize;
        for (index, line) in artifacts.markdown.lines().enumerate() {
            if line.trim_start().starts_with("```") {
                fence_count += 1;
                last_fence_line = index as u32 + 1;
            }
        }

        if fence_count % 2 == 0 {
            return SpecialistOutcome::NoFinding;
        }

        let finding = Finding::new("Unterminated code fence: an odd number of ``` markers")
            .with_signature(ErrorSignature::GenericError)
            .with_detail("fence_count", &fence_count.to_string())
            .with_snippet(
                ContextSnippet::new(SourceKind::Markdown, "```")
                    .with_line(last_fence_line)
                    .with_notes("last fence marker with no closing partner"),
            );
        SpecialistOutcome::Finding(finding)
    }
}

static BEGIN_ENV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\begin\{([A-Za-z*]+)\}").expect("static regex must compile"));
static END_ENV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\end\{([A-Za-z*]+)\}").expect("static regex must compile"));

/// Flags raw LaTeX environments opened in the Markdown but never closed.
pub struct UnclosedEnvironmentCheck;

impl Specialist for UnclosedEnvironmentCheck {
    fn name(&self) -> &'static str {
        "unclosed_environment"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let mut begins: BTreeMap<String, (usize, u32)> = BTreeMap::new();
        let mut ends: BTreeMap<String, usize> = BTreeMap::new();

        for (index, line) in artifacts.markdown.lines().enumerate() {
            for captures in BEGIN_ENV_RE.captures_iter(line) {
                let entry = begins.entry(captures[1].to_string()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 = index as u32 + 1;
            }
            for captures in END_ENV_RE.captures_iter(line) {
                *ends.entry(captures[1].to_string()).or_insert(0) += 1;
            }
        }

        for (environment, (opened, last_line)) in &begins {
            let closed = ends.get(environment).copied().unwrap_or(0);
            if *opened > closed {
                let description = format!(
                    "Environment '{environment}' is opened {opened} time(s) but closed {closed} time(s)"
                );
                let finding = Finding::new(&description)
                    .with_signature(ErrorSignature::MissingEnd)
                    .with_detail("environment", environment)
                    .with_snippet(
                        ContextSnippet::new(
                            SourceKind::Markdown,
                            &format!("\\begin{{{environment}}}"),
                        )
                        .with_line(*last_line),
                    )
                    .with_confidence(0.9);
                return SpecialistOutcome::Finding(finding);
            }
        }

        SpecialistOutcome::NoFinding
    }
}

/// Flags lines with an odd number of inline `$` delimiters.
pub struct UnclosedDollarCheck;

impl Specialist for UnclosedDollarCheck {
    fn name(&self) -> &'static str {
        "unclosed_dollar"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let mut in_fence = false;
        for (index, line) in artifacts.markdown.lines().enumerate() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            // Escaped dollars and display-math pairs are not delimiters of
            // an inline span.
            let cleaned = line.replace(r"\$", "").replace("$$", "");
            if cleaned.matches('$').count() % 2 == 1 {
                let line_number = index as u32 + 1;
                let finding = Finding::new("A '$' math delimiter on this line is never closed")
                    .with_signature(ErrorSignature::MissingMathDelimiters)
                    .with_snippet(
                        ContextSnippet::new(SourceKind::Markdown, line).with_line(line_number),
                    )
                    .with_confidence(0.7);
                return SpecialistOutcome::Finding(finding);
            }
        }

        SpecialistOutcome::NoFinding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts(markdown: &'static str) -> ArtifactSet<'static> {
        ArtifactSet {
            markdown,
            generated_tex: None,
            compile_log: None,
        }
    }

    #[test]
    fn test_code_fence_flags_odd_marker_count() {
        let markdown = "# Doc\n```rust\nlet x = 1;\n";
        let SpecialistOutcome::Finding(finding) = CodeFenceCheck.examine(&artifacts(markdown))
        else {
            panic!("expected a finding");
        };
        assert!(finding.description.contains("code fence"));
        assert_eq!(finding.snippets[0].line, Some(2));
    }

    #[test]
    fn test_code_fence_quiet_on_paired_markers() {
        let markdown = "```\ncode\n```\n";
        assert!(matches!(
            CodeFenceCheck.examine(&artifacts(markdown)),
            SpecialistOutcome::NoFinding
        ));
    }

    #[test]
    fn test_unclosed_environment_detected() {
        let markdown = "text\n\\begin{align}\nx &= 1\n";
        let SpecialistOutcome::Finding(finding) =
            UnclosedEnvironmentCheck.examine(&artifacts(markdown))
        else {
            panic!("expected a finding");
        };
        assert_eq!(
            finding.details.get("environment").map(String::as_str),
            Some("align")
        );
    }

    #[test]
    fn test_closed_environment_is_quiet() {
        let markdown = "\\begin{align}\nx &= 1\n\\end{align}\n";
        assert!(matches!(
            UnclosedEnvironmentCheck.examine(&artifacts(markdown)),
            SpecialistOutcome::NoFinding
        ));
    }

    #[test]
    fn test_unclosed_dollar_detected_with_line() {
        let markdown = "fine line\nbroken $x = 2 line\n";
        let SpecialistOutcome::Finding(finding) =
            UnclosedDollarCheck.examine(&artifacts(markdown))
        else {
            panic!("expected a finding");
        };
        assert_eq!(finding.snippets[0].line, Some(2));
    }

    #[test]
    fn test_dollar_check_ignores_fences_escapes_and_display_math() {
        let markdown = "price is \\$5\n$$\ndisplay\n$$\n```\n$ inside code\n```\n$a + b$\n";
        assert!(matches!(
            UnclosedDollarCheck.examine(&artifacts(markdown)),
            SpecialistOutcome::NoFinding
        ));
    }
}
