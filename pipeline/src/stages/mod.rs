//! Pipeline stage implementations.
//!
//! Each stage is an isolated unit of execution: the worker protocol feeds
//! it a job record and collects the updated record. The bodies here are
//! plain functions so the same code runs inside a stage worker process and
//! in-process under test.

mod convert;
mod investigate;
mod report;
mod resolve;

use md_triage_core::DiagnosticJob;

use crate::error::Result;

pub use report::internal_error_report;

/// Identifies one pipeline stage executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageId {
    /// Conversion and compilation attempt.
    Convert,
    /// Compile-log investigation.
    Investigate,
    /// Remedy mapping.
    Resolve,
    /// Report assembly.
    Report,
}

impl StageId {
    /// Stable stage identifier used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Investigate => "investigate",
            Self::Resolve => "resolve",
            Self::Report => "report",
        }
    }

    /// Parses a command-line stage identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "convert" => Some(Self::Convert),
            "investigate" => Some(Self::Investigate),
            "resolve" => Some(Self::Resolve),
            "report" => Some(Self::Report),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs one stage body in-process.
pub fn run_stage(stage: StageId, job: DiagnosticJob) -> Result<DiagnosticJob> {
    match stage {
        StageId::Convert => convert::run(job),
        StageId::Investigate => investigate::run(job),
        StageId::Resolve => resolve::run(job),
        StageId::Report => report::run(job),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_parse_roundtrip() {
        for stage in [
            StageId::Convert,
            StageId::Investigate,
            StageId::Resolve,
            StageId::Report,
        ] {
            assert_eq!(StageId::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(StageId::parse("unknown"), None);
    }
}
