//! Brace balancing inside math regions of the generated TeX.

use std::sync::LazyLock;

use md_triage_core::{ContextSnippet, ErrorSignature, SOURCE_LINE_DETAIL_KEY, SourceKind};
use regex::Regex;

use crate::specialist::{ArtifactSet, Finding, Specialist, SpecialistOutcome};

static INLINE_MATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\(.*?\\\)").expect("static regex must compile"));
static DISPLAY_MATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\[.*?\\\]").expect("static regex must compile"));
static MATH_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\left|\\right|\\frac|\\sqrt|\\sum|\\int|\\text\{|\\label\{")
        .expect("static regex must compile")
});

/// Counts `{` against `}` inside likely math regions, line by line, and
/// reports the first imbalance.
pub struct UnbalancedBracesCheck;

impl Specialist for UnbalancedBracesCheck {
    fn name(&self) -> &'static str {
        "unbalanced_braces"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let Some(tex) = artifacts.generated_tex else {
            return SpecialistOutcome::NoFinding;
        };

        for (index, line) in tex.lines().enumerate() {
            let line_number = index as u32 + 1;
            for region in math_regions(line) {
                let opens = region.matches('{').count();
                let closes = region.matches('}').count();
                if opens != closes {
                    let description = format!(
                        "Unbalanced braces in math expression: {opens} '{{' but {closes} '}}'"
                    );
                    let finding = Finding::new(&description)
                        .with_signature(ErrorSignature::UnbalancedBraces)
                        .with_detail(SOURCE_LINE_DETAIL_KEY, &line_number.to_string())
                        .with_detail("open_braces", &opens.to_string())
                        .with_detail("close_braces", &closes.to_string())
                        .with_snippet(
                            ContextSnippet::new(SourceKind::GeneratedTex, line)
                                .with_line(line_number),
                        )
                        .with_confidence(0.85);
                    return SpecialistOutcome::Finding(finding);
                }
            }
        }

        SpecialistOutcome::NoFinding
    }
}

/// Math regions of one line: explicit `\( ... \)` and `\[ ... \]` spans, or
/// the whole line when it carries math-heavy commands without explicit
/// delimiters.
fn math_regions(line: &str) -> Vec<&str> {
    let mut regions: Vec<&str> = INLINE_MATH_RE
        .find_iter(line)
        .chain(DISPLAY_MATH_RE.find_iter(line))
        .map(|found| found.as_str())
        .collect();

    if regions.is_empty() && MATH_HINT_RE.is_match(line) {
        regions.push(line);
    }
    regions
}
