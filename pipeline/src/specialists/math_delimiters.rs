//! Math-delimiter analysis: missing `$` delimiters and mismatched
//! `\left`/`\right` pairs.

use std::sync::LazyLock;

use md_triage_core::{ContextSnippet, ErrorSignature, SOURCE_LINE_DETAIL_KEY, SourceKind};
use regex::Regex;

use crate::specialist::{ArtifactSet, Finding, Specialist, SpecialistOutcome};

const MISSING_DOLLAR_PHRASES: &[&str] = &["Missing $ inserted", "Display math should end with $"];

/// Detects missing math-delimiter errors in the compiler log and anchors
/// them in the generated TeX when a source line is available.
pub struct MissingDollarCheck;

impl Specialist for MissingDollarCheck {
    fn name(&self) -> &'static str {
        "missing_dollar"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let Some(log) = artifacts.compile_log else {
            return SpecialistOutcome::NoFinding;
        };

        let lines: Vec<&str> = log.lines().collect();
        let Some(index) = lines.iter().position(|line| {
            MISSING_DOLLAR_PHRASES
                .iter()
                .any(|phrase| line.contains(phrase))
        }) else {
            return SpecialistOutcome::NoFinding;
        };

        let source_line = super::source_line_near(&lines, index, 10);
        let window_end = (index + 6).min(lines.len());

        let mut finding = Finding::new("Math expression is missing a '$' delimiter")
            .with_signature(ErrorSignature::MissingMathDelimiters)
            .with_snippet(ContextSnippet::new(
                SourceKind::CompileLog,
                &lines[index..window_end].join("\n"),
            ));
        if let Some(line) = source_line {
            finding = finding.with_detail(SOURCE_LINE_DETAIL_KEY, &line.to_string());
            if let Some(tex) = artifacts.generated_tex {
                if let Some(snippet) =
                    super::context_snippet_around(tex, SourceKind::GeneratedTex, line, 2)
                {
                    finding = finding.with_snippet(snippet);
                }
            }
        }

        SpecialistOutcome::Finding(finding)
    }
}

static LEFT_RIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(left|right)\s*(\\\{|\\\}|\\\||[()\[\].|])").expect("static regex must compile")
});

fn delimiter_pair(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        r"\{" => r"\}",
        r"\|" => r"\|",
        "|" => "|",
        "." => ".",
        _ => ".",
    }
}

/// Checks `\left`/`\right` pairing in the generated TeX.
///
/// A `.` delimiter matches anything, mirroring how TeX treats the null
/// delimiter.
pub struct PairedDelimiterCheck;

impl Specialist for PairedDelimiterCheck {
    fn name(&self) -> &'static str {
        "paired_delimiters"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let Some(tex) = artifacts.generated_tex else {
            return SpecialistOutcome::NoFinding;
        };

        let mut stack: Vec<(String, u32)> = Vec::new();
        for (index, line) in tex.lines().enumerate() {
            let line_number = index as u32 + 1;
            for captures in LEFT_RIGHT_RE.captures_iter(line) {
                let kind = &captures[1];
                let delimiter = captures[2].to_string();
                if kind == "left" {
                    stack.push((delimiter, line_number));
                    continue;
                }
                let Some((open, open_line)) = stack.pop() else {
                    return SpecialistOutcome::Finding(unmatched_right(&delimiter, line_number, line));
                };
                let expected = delimiter_pair(&open);
                if delimiter != expected && delimiter != "." && open != "." {
                    let description = format!(
                        "Mismatched delimiters: '\\left{open}' on line {open_line} is closed by '\\right{delimiter}'"
                    );
                    let finding = Finding::new(&description)
                        .with_signature(ErrorSignature::MismatchedDelimiters)
                        .with_detail(SOURCE_LINE_DETAIL_KEY, &line_number.to_string())
                        .with_detail("opening_delimiter", &open)
                        .with_detail("closing_delimiter", &delimiter)
                        .with_snippet(
                            ContextSnippet::new(SourceKind::GeneratedTex, line)
                                .with_line(line_number),
                        );
                    return SpecialistOutcome::Finding(finding);
                }
            }
        }

        if let Some((open, open_line)) = stack.pop() {
            let description =
                format!("Unclosed '\\left{open}' on line {open_line} has no matching '\\right'");
            return SpecialistOutcome::Finding(
                Finding::new(&description)
                    .with_signature(ErrorSignature::MismatchedDelimiters)
                    .with_detail(SOURCE_LINE_DETAIL_KEY, &open_line.to_string())
                    .with_confidence(0.9),
            );
        }

        SpecialistOutcome::NoFinding
    }
}

fn unmatched_right(delimiter: &str, line_number: u32, line: &str) -> Finding {
    Finding::new(&format!(
        "'\\right{delimiter}' on line {line_number} has no matching '\\left'"
    ))
    .with_signature(ErrorSignature::MismatchedDelimiters)
    .with_detail(SOURCE_LINE_DETAIL_KEY, &line_number.to_string())
    .with_snippet(ContextSnippet::new(SourceKind::GeneratedTex, line).with_line(line_number))
}
