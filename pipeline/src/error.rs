//! Error types for the diagnostic pipeline engine.
//!
//! Worker-contract violations are deliberately coarse: any of them aborts
//! the whole run, so each variant carries enough context (stage name,
//! captured stderr) to explain the abort to an operator.

use md_triage_core::ValidationError;
use thiserror::Error;

/// Errors that can occur while driving the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The stage worker process could not be spawned.
    #[error("stage '{stage}' could not be spawned: {source}")]
    WorkerSpawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O toward the stage worker failed (stdin write, pipe read, wait).
    #[error("stage '{stage}' I/O failure: {source}")]
    WorkerIo {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    /// The stage worker exceeded its caller-imposed deadline.
    #[error("stage '{stage}' timed out after {seconds}s")]
    WorkerTimeout {
        stage: String,
        seconds: u64,
        stderr: String,
    },

    /// The stage worker exited with a non-zero status.
    #[error("stage '{stage}' exited with status {code:?}: {stderr}")]
    WorkerFailed {
        stage: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The stage worker exited cleanly but wrote no job record.
    #[error("stage '{stage}' produced no output")]
    WorkerEmptyOutput { stage: String, stderr: String },

    /// The stage worker's output was not a decodable job record.
    #[error("stage '{stage}' produced malformed output: {detail}")]
    WorkerMalformedOutput {
        stage: String,
        detail: String,
        stderr: String,
    },

    /// The stage worker's output failed structural validation.
    #[error("stage '{stage}' produced an invalid job record: {}", format_violations(violations))]
    WorkerInvalidOutput {
        stage: String,
        violations: Vec<ValidationError>,
    },

    /// A stage was invoked with preconditions unmet.
    #[error("stage '{stage}' contract violation: {detail}")]
    StageContract { stage: String, detail: String },

    /// The report stage returned without populating the final report.
    #[error("report stage completed without producing a final report")]
    MissingFinalReport,

    /// Job-record serialization or deserialization failed locally.
    #[error("job serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local filesystem failure (scratch directory, artifact files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The worker stderr captured alongside this error, when any.
    pub fn worker_stderr(&self) -> Option<&str> {
        match self {
            Self::WorkerTimeout { stderr, .. }
            | Self::WorkerFailed { stderr, .. }
            | Self::WorkerEmptyOutput { stderr, .. }
            | Self::WorkerMalformedOutput { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn format_violations(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias for results with [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
