//! Stable error-signature vocabulary shared by the classifier and the
//! remedy mapper.

use serde::{Deserialize, Serialize};

/// Detail-bag key under which analyzers record the classified signature.
pub const SIGNATURE_DETAIL_KEY: &str = "error_signature";

/// Detail-bag key under which analyzers record the located source line.
pub const SOURCE_LINE_DETAIL_KEY: &str = "source_line";

/// Classification tag for a recognized compiler-log error pattern.
///
/// The wire form is snake_case and matches [`ErrorSignature::as_str`], so a
/// tag stored in a lead's detail bag can be recovered with
/// [`ErrorSignature::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSignature {
    CompilationSuccess,
    NoOutputGenerated,
    MissingMathDelimiters,
    UnbalancedBraces,
    MismatchedDelimiters,
    MisplacedAlignmentTab,
    UndefinedControlSequence,
    UndefinedEnvironment,
    UndefinedCommand,
    CommandAlreadyDefined,
    MissingBeginDocument,
    MissingDocumentclass,
    PreambleOnlyCommand,
    MathModeRequired,
    FileNotFound,
    MissingNumber,
    IllegalUnit,
    UnexpectedParagraphEnd,
    RunawayArgument,
    TooManyClosingBraces,
    EnvironmentMismatch,
    MissingEnd,
    GenericError,
    /// Universal fallback: nothing recognizable was found in the log.
    NoErrorIdentified,
}

impl ErrorSignature {
    /// Returns the stable snake_case tag for this signature.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompilationSuccess => "compilation_success",
            Self::NoOutputGenerated => "no_output_generated",
            Self::MissingMathDelimiters => "missing_math_delimiters",
            Self::UnbalancedBraces => "unbalanced_braces",
            Self::MismatchedDelimiters => "mismatched_delimiters",
            Self::MisplacedAlignmentTab => "misplaced_alignment_tab",
            Self::UndefinedControlSequence => "undefined_control_sequence",
            Self::UndefinedEnvironment => "undefined_environment",
            Self::UndefinedCommand => "undefined_command",
            Self::CommandAlreadyDefined => "command_already_defined",
            Self::MissingBeginDocument => "missing_begin_document",
            Self::MissingDocumentclass => "missing_documentclass",
            Self::PreambleOnlyCommand => "preamble_only_command",
            Self::MathModeRequired => "math_mode_required",
            Self::FileNotFound => "file_not_found",
            Self::MissingNumber => "missing_number",
            Self::IllegalUnit => "illegal_unit",
            Self::UnexpectedParagraphEnd => "unexpected_paragraph_end",
            Self::RunawayArgument => "runaway_argument",
            Self::TooManyClosingBraces => "too_many_closing_braces",
            Self::EnvironmentMismatch => "environment_mismatch",
            Self::MissingEnd => "missing_end",
            Self::GenericError => "generic_error",
            Self::NoErrorIdentified => "no_error_identified",
        }
    }

    /// Parses a stable tag back into a signature.
    pub fn parse(tag: &str) -> Option<Self> {
        let signature = match tag {
            "compilation_success" => Self::CompilationSuccess,
            "no_output_generated" => Self::NoOutputGenerated,
            "missing_math_delimiters" => Self::MissingMathDelimiters,
            "unbalanced_braces" => Self::UnbalancedBraces,
            "mismatched_delimiters" => Self::MismatchedDelimiters,
            "misplaced_alignment_tab" => Self::MisplacedAlignmentTab,
            "undefined_control_sequence" => Self::UndefinedControlSequence,
            "undefined_environment" => Self::UndefinedEnvironment,
            "undefined_command" => Self::UndefinedCommand,
            "command_already_defined" => Self::CommandAlreadyDefined,
            "missing_begin_document" => Self::MissingBeginDocument,
            "missing_documentclass" => Self::MissingDocumentclass,
            "preamble_only_command" => Self::PreambleOnlyCommand,
            "math_mode_required" => Self::MathModeRequired,
            "file_not_found" => Self::FileNotFound,
            "missing_number" => Self::MissingNumber,
            "illegal_unit" => Self::IllegalUnit,
            "unexpected_paragraph_end" => Self::UnexpectedParagraphEnd,
            "runaway_argument" => Self::RunawayArgument,
            "too_many_closing_braces" => Self::TooManyClosingBraces,
            "environment_mismatch" => Self::EnvironmentMismatch,
            "missing_end" => Self::MissingEnd,
            "generic_error" => Self::GenericError,
            "no_error_identified" => Self::NoErrorIdentified,
            _ => return None,
        };
        Some(signature)
    }

    /// Whether this signature describes a problem worth reporting as a lead.
    ///
    /// Success reports and the universal fallback carry no actionable
    /// information.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::CompilationSuccess | Self::NoErrorIdentified)
    }
}

impl std::fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
