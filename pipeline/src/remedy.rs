//! Remedy mapping.
//!
//! Turns leads into concrete Markdown-level fixes by evaluating an ordered
//! rule table. Every rule requires a signature match and may additionally
//! require a secondary pattern over the lead's description; when the
//! secondary pattern misses, evaluation continues with the next rule. A
//! lead never maps to zero remedies: unmatched leads fall back to excerpt
//! interpretation and, failing that, one generic low-confidence remedy.

use std::sync::LazyLock;

use md_triage_core::{ErrorSignature, Lead, Remedy, SIGNATURE_DETAIL_KEY, SourceKind};
use regex::{Captures, Regex};
use tracing::debug;

/// Stage name recorded on every mapped remedy.
pub const RESOLVE_STAGE: &str = "resolve";

struct RemedyRule {
    signature: ErrorSignature,
    description_pattern: Option<Regex>,
    explanation: &'static str,
    fix_instruction: &'static str,
    confidence: f64,
}

fn rule(
    signature: ErrorSignature,
    description_pattern: Option<&str>,
    explanation: &'static str,
    fix_instruction: &'static str,
    confidence: f64,
) -> RemedyRule {
    RemedyRule {
        signature,
        description_pattern: description_pattern
            .map(|pattern| Regex::new(pattern).expect("static remedy pattern must compile")),
        explanation,
        fix_instruction,
        confidence,
    }
}

/// The ordered remedy rule table. First full match wins.
static REMEDY_RULES: LazyLock<Vec<RemedyRule>> = LazyLock::new(|| {
    vec![
        rule(
            ErrorSignature::UndefinedControlSequence,
            Some(r"'\\([a-zA-Z@]+)'"),
            "The LaTeX command '\\{1}' is not defined at the point it is used.",
            "Check the spelling of '\\{1}' in your Markdown. If it comes from a LaTeX \
             package, that package is not loaded by the converter's default template; \
             rewrite the construct in plain Markdown or remove it.",
            0.9,
        ),
        rule(
            ErrorSignature::UndefinedControlSequence,
            None,
            "A LaTeX command used in your document is not defined.",
            "Look for raw LaTeX commands (words starting with '\\') in your Markdown and \
             check them for typos, or remove commands that need packages the converter \
             does not load.",
            0.8,
        ),
        rule(
            ErrorSignature::UndefinedEnvironment,
            Some(r"'([A-Za-z*]+)'"),
            "The LaTeX environment '{1}' is not defined.",
            "The '{1}' block needs a package the converter does not load. Replace it \
             with plain Markdown, or with an environment the default template supports.",
            0.85,
        ),
        rule(
            ErrorSignature::UndefinedEnvironment,
            None,
            "A LaTeX environment used in your document is not defined.",
            "Find the '\\begin{...}' block in your Markdown and replace it with plain \
             Markdown or a supported environment.",
            0.75,
        ),
        rule(
            ErrorSignature::MissingMathDelimiters,
            None,
            "A math expression is missing its delimiters.",
            "Check for math expressions that are not enclosed in '$ ... $' or \
             '$$ ... $$', and close any '$' that was opened but never matched.",
            0.9,
        ),
        rule(
            ErrorSignature::MismatchedDelimiters,
            None,
            "Paired delimiters do not match.",
            "You have a mismatch in paired delimiters, for example '\\left(' closed by \
             '\\right]' instead of '\\right)'. Check the math expressions in your \
             Markdown and make every '\\left' and '\\right' use the same bracket shape.",
            0.9,
        ),
        rule(
            ErrorSignature::RunawayArgument,
            None,
            "A command argument is opened but never closed.",
            "A command in your document has a missing closing brace '}'. Find the last \
             command before the reported line and add the closing brace.",
            0.85,
        ),
        rule(
            ErrorSignature::UnbalancedBraces,
            None,
            "Curly braces are unbalanced.",
            "You have an unequal number of '{' and '}'. Check LaTeX commands and math \
             expressions in your Markdown for a forgotten or extra brace.",
            0.85,
        ),
        rule(
            ErrorSignature::TooManyClosingBraces,
            None,
            "There are more closing braces than opening ones.",
            "Remove the extra '}' or add the missing '{' in the affected expression.",
            0.85,
        ),
        rule(
            ErrorSignature::UnexpectedParagraphEnd,
            None,
            "A paragraph ended while a command was still being read.",
            "A command spans a blank line, which LaTeX treats as a paragraph break. \
             Close the command's braces before the blank line or remove the break.",
            0.8,
        ),
        rule(
            ErrorSignature::MissingEnd,
            None,
            "An environment is opened but never closed.",
            "Every '\\begin{...}' needs a matching '\\end{...}'. Add the missing \
             '\\end' for the environment named in the issue.",
            0.85,
        ),
        rule(
            ErrorSignature::EnvironmentMismatch,
            None,
            "An environment is closed by a different environment's '\\end'.",
            "Make the '\\end{...}' name match its '\\begin{...}'.",
            0.8,
        ),
        rule(
            ErrorSignature::FileNotFound,
            None,
            "The compiler could not find a referenced file.",
            "Check image and include paths in your Markdown. Paths are resolved \
             relative to the document; fix the path or remove the reference.",
            0.8,
        ),
        rule(
            ErrorSignature::MissingBeginDocument,
            None,
            "Raw LaTeX in the document interferes with its preamble structure.",
            "Your Markdown contains raw LaTeX that belongs in a document preamble. \
             Remove '\\documentclass', '\\usepackage', or similar lines from the text.",
            0.7,
        ),
        rule(
            ErrorSignature::MissingDocumentclass,
            None,
            "The generated document lost its '\\documentclass' declaration.",
            "Raw LaTeX in your Markdown likely disrupted the generated preamble. \
             Remove document-level LaTeX commands from the text.",
            0.7,
        ),
        rule(
            ErrorSignature::PreambleOnlyCommand,
            None,
            "A preamble-only command appears in the document body.",
            "Commands like '\\usepackage' only work before the document starts. Remove \
             them from your Markdown text.",
            0.7,
        ),
        rule(
            ErrorSignature::MathModeRequired,
            None,
            "A math-only command is used outside math mode.",
            "Wrap the expression using the command in '$ ... $'.",
            0.8,
        ),
        rule(
            ErrorSignature::MisplacedAlignmentTab,
            None,
            "An alignment character '&' appears outside an alignment environment.",
            "Escape literal ampersands as '\\&' in your Markdown, or put the '&' inside \
             an alignment environment such as 'align'.",
            0.8,
        ),
        rule(
            ErrorSignature::MissingNumber,
            None,
            "A command expected a number and found none.",
            "A length or counter argument is malformed. Check raw LaTeX commands that \
             take numeric arguments.",
            0.6,
        ),
        rule(
            ErrorSignature::IllegalUnit,
            None,
            "A length is missing a valid unit.",
            "Lengths in raw LaTeX need units such as 'pt', 'em', or 'cm'. Fix the \
             length argument.",
            0.6,
        ),
        rule(
            ErrorSignature::NoOutputGenerated,
            None,
            "Compilation finished but produced no pages.",
            "The document body may be empty or consumed by an unclosed construct. \
             Check for unclosed environments or braces near the end of the document.",
            0.5,
        ),
        rule(
            ErrorSignature::GenericError,
            Some(r"(?i)code fence"),
            "A fenced code block is never closed.",
            "Add the missing closing '```' so every fence has a partner.",
            0.85,
        ),
        rule(
            ErrorSignature::GenericError,
            None,
            "The compiler reported an error the analyzers could not narrow down.",
            "Read the attached log excerpt; the first line after '!' names the \
             problem, and 'l.<number>' points at the offending line of the generated \
             document.",
            0.5,
        ),
    ]
});

/// One weighted suggestion produced by excerpt interpretation.
struct Suggestion {
    explanation: String,
    fix_instruction: String,
    confidence: f64,
}

/// Maps one lead to its remedies.
///
/// The result is never empty.
pub fn map_lead(lead: &Lead) -> Vec<Remedy> {
    let signature = lead
        .detail(SIGNATURE_DETAIL_KEY)
        .and_then(ErrorSignature::parse);

    if let Some(signature) = signature {
        for rule in REMEDY_RULES
            .iter()
            .filter(|rule| rule.signature == signature)
        {
            match &rule.description_pattern {
                None => return vec![build_remedy(rule, None, lead)],
                Some(pattern) => {
                    if let Some(captures) = pattern.captures(&lead.description) {
                        return vec![build_remedy(rule, Some(captures), lead)];
                    }
                    // Secondary pattern missed; keep evaluating rules.
                }
            }
        }
    }

    let excerpt = lead.snippets.iter().find(|snippet| {
        matches!(
            snippet.source,
            SourceKind::CompileLog | SourceKind::ConversionLog
        )
    });
    if let Some(excerpt) = excerpt {
        let suggestions = interpret_excerpt(&excerpt.text);
        if !suggestions.is_empty() {
            debug!(
                lead = %lead.id,
                count = suggestions.len(),
                "Mapped lead via excerpt interpretation"
            );
            return suggestions
                .into_iter()
                .map(|suggestion| {
                    Remedy::new(
                        &lead.id,
                        RESOLVE_STAGE,
                        &suggestion.explanation,
                        &suggestion.fix_instruction,
                    )
                    .with_confidence(suggestion.confidence)
                })
                .collect();
        }
    }

    vec![generic_remedy(lead)]
}

fn build_remedy(rule: &RemedyRule, captures: Option<Captures<'_>>, lead: &Lead) -> Remedy {
    let explanation = fill_template(rule.explanation, captures.as_ref());
    let mut fix = fill_template(rule.fix_instruction, captures.as_ref());

    if rule.signature == ErrorSignature::UndefinedControlSequence {
        if let Some(package) = lead.detail("package_hint") {
            fix.push_str(&format!(
                " This command is normally provided by the '{package}' LaTeX package."
            ));
        }
    }

    Remedy::new(&lead.id, RESOLVE_STAGE, &explanation, &fix).with_confidence(rule.confidence)
}

/// Replaces `{1}`-style placeholders with secondary-pattern capture groups.
fn fill_template(template: &str, captures: Option<&Captures<'_>>) -> String {
    let Some(captures) = captures else {
        return template.to_string();
    };
    let mut filled = template.to_string();
    for index in 1..captures.len() {
        if let Some(group) = captures.get(index) {
            filled = filled.replace(&format!("{{{index}}}"), group.as_str());
        }
    }
    filled
}

/// Interpretation pass over a raw log excerpt when no rule matched: each
/// recognized hint becomes one weighted suggestion.
fn interpret_excerpt(excerpt: &str) -> Vec<Suggestion> {
    let lower = excerpt.to_ascii_lowercase();
    let mut suggestions = Vec::new();

    if lower.contains("undefined") {
        suggestions.push(Suggestion {
            explanation: "The log mentions an undefined name.".to_string(),
            fix_instruction: "Check raw LaTeX commands and environments in your Markdown \
                              for typos or constructs the converter does not support."
                .to_string(),
            confidence: 0.6,
        });
    }
    if lower.contains("missing") {
        suggestions.push(Suggestion {
            explanation: "The log mentions something missing.".to_string(),
            fix_instruction: "Check for unclosed '$' delimiters, unmatched braces, and \
                              environments without an '\\end'."
                .to_string(),
            confidence: 0.5,
        });
    }
    if lower.contains("not found") {
        suggestions.push(Suggestion {
            explanation: "The log mentions a file that could not be found.".to_string(),
            fix_instruction: "Check image and include paths referenced from the Markdown."
                .to_string(),
            confidence: 0.5,
        });
    }
    if lower.contains("emergency stop") || lower.contains("file ended") {
        suggestions.push(Suggestion {
            explanation: "Compilation stopped before the document was complete.".to_string(),
            fix_instruction: "Something consumes the rest of the document, usually an \
                              unclosed brace or environment near the end."
                .to_string(),
            confidence: 0.4,
        });
    }

    suggestions
}

fn generic_remedy(lead: &Lead) -> Remedy {
    Remedy::new(
        &lead.id,
        RESOLVE_STAGE,
        &format!("A problem was detected: {}", lead.description),
        "The analyzers could not map this problem to a specific fix. Review the \
         attached context manually and simplify the affected part of the document.",
    )
    .with_confidence(0.3)
}
