//! Specialist analyzers, grouped by the artifact they probe.
//!
//! The compile-log group probes disjoint failure classes and is swept in
//! run-all mode; the Markdown group contains redundant probes for
//! conversion failures and is swept first-match.

mod braces;
mod markdown_checks;
mod math_delimiters;
mod runaway_argument;
mod undefined_command;
mod undefined_environment;

use std::sync::LazyLock;

use md_triage_core::{ContextSnippet, SourceKind};
use regex::Regex;

use crate::specialist::Specialist;

pub use braces::UnbalancedBracesCheck;
pub use markdown_checks::{CodeFenceCheck, UnclosedDollarCheck, UnclosedEnvironmentCheck};
pub use math_delimiters::{MissingDollarCheck, PairedDelimiterCheck};
pub use runaway_argument::RunawayArgumentCheck;
pub use undefined_command::UndefinedCommandCheck;
pub use undefined_environment::UndefinedEnvironmentCheck;

/// The compile-log specialist group, in fixed sweep order.
pub fn compile_log_group() -> Vec<Box<dyn Specialist>> {
    vec![
        Box::new(UndefinedCommandCheck),
        Box::new(UndefinedEnvironmentCheck),
        Box::new(MissingDollarCheck),
        Box::new(RunawayArgumentCheck),
        Box::new(UnbalancedBracesCheck),
        Box::new(PairedDelimiterCheck),
    ]
}

/// The Markdown specialist group used when conversion itself fails.
pub fn markdown_group() -> Vec<Box<dyn Specialist>> {
    vec![
        Box::new(CodeFenceCheck),
        Box::new(UnclosedEnvironmentCheck),
        Box::new(UnclosedDollarCheck),
    ]
}

static SOURCE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"l\.(\d+)").expect("static regex must compile"));

/// Searches the lines after `start` for the compiler's `l.<num>` source-line
/// indicator, within a bounded window.
pub(crate) fn source_line_near(lines: &[&str], start: usize, window: usize) -> Option<u32> {
    lines
        .iter()
        .skip(start)
        .take(window + 1)
        .find_map(|line| SOURCE_LINE_RE.captures(line))
        .and_then(|captures| captures[1].parse().ok())
}

/// Builds a marked-up context snippet around a 1-based line of a document.
///
/// Lines are rendered with their number, the central line prefixed `>>`, the
/// way compiler logs point at source.
pub fn context_snippet_around(
    content: &str,
    source: SourceKind,
    line: u32,
    window: usize,
) -> Option<ContextSnippet> {
    let lines: Vec<&str> = content.lines().collect();
    if line == 0 || line as usize > lines.len() {
        return None;
    }

    let target = line as usize - 1;
    let start = target.saturating_sub(window);
    let end = (target + window + 1).min(lines.len());
    let rendered = (start..end)
        .map(|index| {
            let marker = if index == target { ">> " } else { "   " };
            format!("{marker}l.{} {}", index + 1, lines[index])
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(ContextSnippet::new(source, &rendered).with_line(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_line_near_finds_indicator_in_window() {
        let lines = ["! boom", "<text>", "l.17 foo"];
        assert_eq!(source_line_near(&lines, 0, 5), Some(17));
        assert_eq!(source_line_near(&lines, 0, 1), None);
    }

    #[test]
    fn test_context_snippet_marks_central_line() {
        let content = "one\ntwo\nthree\nfour\nfive";
        let snippet = context_snippet_around(content, SourceKind::GeneratedTex, 3, 1).unwrap();
        assert_eq!(snippet.line, Some(3));
        assert!(snippet.text.contains(">> l.3 three"));
        assert!(snippet.text.contains("   l.2 two"));
        assert!(!snippet.text.contains("l.5"));
    }

    #[test]
    fn test_context_snippet_rejects_out_of_bounds_lines() {
        assert!(context_snippet_around("a\nb", SourceKind::GeneratedTex, 0, 1).is_none());
        assert!(context_snippet_around("a\nb", SourceKind::GeneratedTex, 9, 1).is_none());
    }
}
