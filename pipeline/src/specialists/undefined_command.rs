//! Undefined-control-sequence analysis of compiler logs.

use std::sync::LazyLock;

use md_triage_core::{
    ContextSnippet, ErrorSignature, SOURCE_LINE_DETAIL_KEY, SourceKind,
};
use regex::Regex;

use crate::specialist::{ArtifactSet, Finding, Specialist, SpecialistOutcome};

/// Commands commonly used in Markdown-embedded LaTeX, mapped to the package
/// that defines them. Used to suggest the likely missing package.
const COMMAND_PACKAGES: &[(&str, &str)] = &[
    ("DeclareMathOperator", "amsmath"),
    ("intertext", "amsmath"),
    ("numberwithin", "amsmath"),
    ("prescript", "mathtools"),
    ("includegraphics", "graphicx"),
    ("rotatebox", "graphicx"),
    ("scalebox", "graphicx"),
    ("resizebox", "graphicx"),
    ("toprule", "booktabs"),
    ("midrule", "booktabs"),
    ("bottomrule", "booktabs"),
    ("cmidrule", "booktabs"),
    ("url", "hyperref"),
    ("href", "hyperref"),
    ("autoref", "hyperref"),
    ("nameref", "hyperref"),
    ("lstset", "listings"),
    ("lstinputlisting", "listings"),
    ("si", "siunitx"),
    ("SI", "siunitx"),
    ("num", "siunitx"),
];

static COMMAND_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\([a-zA-Z@]+)").expect("static regex must compile"));

/// Detects `Undefined control sequence` errors and names the offending
/// command when the log reveals it.
pub struct UndefinedCommandCheck;

impl Specialist for UndefinedCommandCheck {
    fn name(&self) -> &'static str {
        "undefined_command"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let Some(log) = artifacts.compile_log else {
            return SpecialistOutcome::NoFinding;
        };

        let lines: Vec<&str> = log.lines().collect();
        let Some(start) = lines
            .iter()
            .position(|line| line.contains("Undefined control sequence"))
        else {
            return SpecialistOutcome::NoFinding;
        };

        let window_end = (start + 10).min(lines.len());
        let window = &lines[start..window_end];
        let source_line = super::source_line_near(&lines, start, 10);
        let command = extract_command(window);

        let description = match &command {
            Some(name) => format!("Undefined control sequence '\\{name}'"),
            None => "Undefined control sequence".to_string(),
        };

        let mut finding = Finding::new(&description)
            .with_signature(ErrorSignature::UndefinedControlSequence)
            .with_snippet({
                let mut snippet =
                    ContextSnippet::new(SourceKind::CompileLog, &window.join("\n"));
                if let Some(line) = source_line {
                    snippet = snippet.with_line(line);
                }
                snippet
            });

        if let Some(line) = source_line {
            finding = finding.with_detail(SOURCE_LINE_DETAIL_KEY, &line.to_string());
        }
        if let Some(name) = &command {
            finding = finding.with_detail("command", name);
            if let Some((_, package)) = COMMAND_PACKAGES
                .iter()
                .find(|(candidate, _)| candidate == name)
            {
                finding = finding.with_detail("package_hint", package);
            }
        }

        SpecialistOutcome::Finding(finding)
    }
}

/// Pulls the offending command name out of the error window. The compiler
/// echoes the source line up to the bad token, so the last command on the
/// `l.<num>` line is the best candidate; `<recently read>` lines are the
/// fallback.
fn extract_command(window: &[&str]) -> Option<String> {
    for line in window {
        let trimmed = line.trim_start();
        if trimmed.starts_with("l.") {
            if let Some(captures) = COMMAND_TOKEN_RE.captures_iter(line).last() {
                return Some(captures[1].to_string());
            }
        }
    }
    window.iter().find_map(|line| {
        line.contains("<recently read>")
            .then(|| COMMAND_TOKEN_RE.captures(line).map(|c| c[1].to_string()))
            .flatten()
    })
}
