//! Undefined-environment analysis of compiler logs.

use std::sync::LazyLock;

use md_triage_core::{ContextSnippet, ErrorSignature, SOURCE_LINE_DETAIL_KEY, SourceKind};
use regex::Regex;

use crate::specialist::{ArtifactSet, Finding, Specialist, SpecialistOutcome};

static UNDEFINED_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Environment ([A-Za-z*@]+) undefined").expect("static regex must compile")
});

/// Detects `Environment ... undefined` errors and names the environment.
pub struct UndefinedEnvironmentCheck;

impl Specialist for UndefinedEnvironmentCheck {
    fn name(&self) -> &'static str {
        "undefined_environment"
    }

    fn examine(&self, artifacts: &ArtifactSet<'_>) -> SpecialistOutcome {
        let Some(log) = artifacts.compile_log else {
            return SpecialistOutcome::NoFinding;
        };

        let lines: Vec<&str> = log.lines().collect();
        let Some((index, captures)) = lines
            .iter()
            .enumerate()
            .find_map(|(index, line)| UNDEFINED_ENV_RE.captures(line).map(|c| (index, c)))
        else {
            return SpecialistOutcome::NoFinding;
        };

        let environment = captures[1].to_string();
        let source_line = super::source_line_near(&lines, index, 10);
        let window_end = (index + 6).min(lines.len());

        let mut finding = Finding::new(&format!("Environment '{environment}' is undefined"))
            .with_signature(ErrorSignature::UndefinedEnvironment)
            .with_detail("environment", &environment)
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
    fn test_names_the_undefined_environment() {
        let log = "! LaTeX Error: Environment theorem undefined.\n\nl.12 \\begin{theorem}\n";
        let artifacts = ArtifactSet {
            markdown: "",
            generated_tex: None,
            compile_log: Some(log),
        };
        let SpecialistOutcome::Finding(finding) = UndefinedEnvironmentCheck.examine(&artifacts)
        else {
            panic!("expected a finding");
        };
        assert_eq!(finding.description, "Environment 'theorem' is undefined");
        assert_eq!(
            finding.details.get("environment").map(String::as_str),
            Some("theorem")
        );
        assert_eq!(
            finding.details.get("source_line").map(String::as_str),
            Some("12")
        );
    }

    #[test]
    fn test_quiet_on_unrelated_logs() {
        let artifacts = ArtifactSet {
            markdown: "",
            generated_tex: None,
            compile_log: Some("! Missing $ inserted.\n"),
        };
        assert!(matches!(
            UndefinedEnvironmentCheck.examine(&artifacts),
            SpecialistOutcome::NoFinding
        ));
    }
}
