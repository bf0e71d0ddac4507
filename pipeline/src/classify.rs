//! Compiler-log classification.
//!
//! Maps raw TeX compiler output to a stable [`ErrorSignature`], a best-guess
//! 1-based source line, and an excerpt suitable for context snippets. The
//! classifier is total: it never fails, falling back to
//! [`ErrorSignature::NoErrorIdentified`] for anything unrecognizable, because
//! it runs over arbitrary external-tool output.

use std::sync::LazyLock;

use md_triage_core::ErrorSignature;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum excerpt lines collected after the primary error marker.
const MAX_EXCERPT_LINES: usize = 15;

/// How far into the excerpt the source-line indicator is searched for.
const MAX_LINE_SEARCH_WINDOW: usize = 10;

/// Leading token the compiler emits on fatal error lines.
const PRIMARY_ERROR_MARKER: &str = "! ";

/// Sentinel phrases that end the useful part of an error block.
const MEMORY_SENTINEL: &str = "Here is how much of TeX's memory";
const NO_PAGES_SENTINEL: &str = "No pages of output.";

/// Phrase present in pure success reports.
const OUTPUT_WRITTEN_PHRASE: &str = "Output written on";

static SOURCE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^l\.(\d+)").expect("static regex must compile"));

/// One ordered classification rule: pattern over the excerpt, tag to assign.
struct SignatureRule {
    pattern: Regex,
    signature: ErrorSignature,
}

fn rule(pattern: &str, signature: ErrorSignature) -> SignatureRule {
    SignatureRule {
        pattern: RegexBuilder::new(pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .expect("static signature pattern must compile"),
        signature,
    }
}

/// The ordered signature table, most specific patterns first. The final
/// catch-all matches any primary-error block.
static SIGNATURE_TABLE: LazyLock<Vec<SignatureRule>> = LazyLock::new(|| {
    vec![
        rule(r"Output written on", ErrorSignature::CompilationSuccess),
        rule(r"No pages of output", ErrorSignature::NoOutputGenerated),
        rule(r"Missing \$ inserted", ErrorSignature::MissingMathDelimiters),
        rule(
            r"Display math should end with \$",
            ErrorSignature::MissingMathDelimiters,
        ),
        rule(r"Extra \}, or forgotten \$", ErrorSignature::UnbalancedBraces),
        rule(r"Missing \\right", ErrorSignature::MismatchedDelimiters),
        rule(r"Missing \\left", ErrorSignature::MismatchedDelimiters),
        rule(
            r"Misplaced alignment tab character &",
            ErrorSignature::MisplacedAlignmentTab,
        ),
        rule(
            r"Undefined control sequence",
            ErrorSignature::UndefinedControlSequence,
        ),
        rule(
            r"Command .* already defined",
            ErrorSignature::CommandAlreadyDefined,
        ),
        rule(r"Command .* undefined", ErrorSignature::UndefinedCommand),
        rule(
            r"Environment .* undefined",
            ErrorSignature::UndefinedEnvironment,
        ),
        rule(
            r"Missing \\begin\{document\}",
            ErrorSignature::MissingBeginDocument,
        ),
        rule(r"Missing documentclass", ErrorSignature::MissingDocumentclass),
        rule(
            r"Can be used only in preamble",
            ErrorSignature::PreambleOnlyCommand,
        ),
        rule(
            r"Can be used only in math mode",
            ErrorSignature::MathModeRequired,
        ),
        rule(r"I can't find file", ErrorSignature::FileNotFound),
        rule(r"File `[^']*' not found", ErrorSignature::FileNotFound),
        rule(
            r"Missing number, treated as zero",
            ErrorSignature::MissingNumber,
        ),
        rule(r"Illegal unit of measure", ErrorSignature::IllegalUnit),
        rule(
            r"Paragraph ended before .* was complete",
            ErrorSignature::UnexpectedParagraphEnd,
        ),
        rule(r"Runaway argument", ErrorSignature::RunawayArgument),
        rule(r"Too many \}", ErrorSignature::TooManyClosingBraces),
        rule(
            r"\\begin\{.*\} .* ended by \\end\{.*\}",
            ErrorSignature::EnvironmentMismatch,
        ),
        rule(r"Missing \\end", ErrorSignature::MissingEnd),
        rule(r"LaTeX Error", ErrorSignature::GenericError),
        rule(r"(?m)^!", ErrorSignature::GenericError),
    ]
});

/// Result of classifying one compiler log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogClassification {
    /// Stable tag for the recognized error pattern.
    pub signature: ErrorSignature,
    /// 1-based line in the TeX source the compiler pointed at, when found.
    pub source_line: Option<u32>,
    /// Excerpt of the log centered on the first error block.
    pub excerpt: String,
    /// The primary error line with its marker stripped, when one exists.
    pub raw_error: Option<String>,
}

impl LogClassification {
    fn unidentified(excerpt: &str) -> Self {
        Self {
            signature: ErrorSignature::NoErrorIdentified,
            source_line: None,
            excerpt: excerpt.to_string(),
            raw_error: None,
        }
    }
}

/// Classifies raw compiler log text.
///
/// Only the first primary error block is analyzed; later errors in the same
/// log are ignored on the assumption that they cascade from the first.
///
/// # Examples
///
/// ```
/// use md_triage_core::ErrorSignature;
/// use md_triage_pipeline::classify::classify_log;
///
/// let log = "! Undefined control sequence.\nl.42 \\badmacro\n";
/// let result = classify_log(log);
/// assert_eq!(result.signature, ErrorSignature::UndefinedControlSequence);
/// assert_eq!(result.source_line, Some(42));
/// ```
pub fn classify_log(log: &str) -> LogClassification {
    if log.trim().is_empty() {
        return LogClassification::unidentified("Log content was empty.");
    }

    let lines: Vec<&str> = log.lines().collect();
    let Some(start) = lines
        .iter()
        .position(|line| line.starts_with(PRIMARY_ERROR_MARKER))
    else {
        // A log that is a pure success report still classifies as success
        // even though it contains no primary-error marker.
        if log.contains(OUTPUT_WRITTEN_PHRASE) {
            let excerpt = lines
                .iter()
                .find(|line| line.contains(OUTPUT_WRITTEN_PHRASE))
                .copied()
                .unwrap_or_default();
            return LogClassification {
                signature: ErrorSignature::CompilationSuccess,
                source_line: None,
                excerpt: excerpt.to_string(),
                raw_error: None,
            };
        }
        return LogClassification::unidentified(
            "No primary error marker found anywhere in the log.",
        );
    };

    let raw_error = lines[start][PRIMARY_ERROR_MARKER.len()..].trim().to_string();
    let mut excerpt_lines = vec![lines[start]];
    let mut source_line: Option<u32> = None;

    for offset in 1..=MAX_EXCERPT_LINES {
        let Some(line) = lines.get(start + offset) else {
            break;
        };
        excerpt_lines.push(line);

        if source_line.is_none() && offset <= MAX_LINE_SEARCH_WINDOW {
            if let Some(captures) = SOURCE_LINE_RE.captures(line.trim_start()) {
                source_line = captures[1].parse().ok();
            }
        }

        if (line.trim().is_empty() && offset > 2)
            || line.starts_with(PRIMARY_ERROR_MARKER)
            || line.starts_with(MEMORY_SENTINEL)
            || line.starts_with(NO_PAGES_SENTINEL)
        {
            break;
        }
    }

    let excerpt = excerpt_lines.join("\n").trim().to_string();

    let mut signature = SIGNATURE_TABLE
        .iter()
        .find(|rule| rule.pattern.is_match(&excerpt))
        .map(|rule| rule.signature)
        .unwrap_or(ErrorSignature::NoErrorIdentified);

    // Override rules, evaluated in fixed order after the table. These
    // replace the table's choice when the excerpt carries narrower,
    // higher-confidence token combinations.
    if excerpt.contains(OUTPUT_WRITTEN_PHRASE) && !excerpt.to_ascii_lowercase().contains("error") {
        signature = ErrorSignature::CompilationSuccess;
    }
    if excerpt.contains(r"Missing \end") {
        signature = ErrorSignature::MissingEnd;
    }
    if excerpt.contains(r"\left(") && excerpt.contains(r"\right]") {
        signature = ErrorSignature::MismatchedDelimiters;
    }
    if excerpt.contains("Runaway argument") {
        signature = ErrorSignature::RunawayArgument;
    }

    debug!(
        signature = %signature,
        source_line = ?source_line,
        "Classified compiler log"
    );

    LogClassification {
        signature,
        source_line,
        excerpt,
        raw_error: Some(raw_error),
    }
}
