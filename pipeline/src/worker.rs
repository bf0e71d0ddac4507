//! Worker invocation protocol.
//!
//! Each pipeline stage runs as an isolated process with a fixed contract:
//! it reads one serialized job record from stdin, writes exactly one updated
//! job record to stdout, logs to stderr, and exits 0. Anything else is a
//! fatal contract violation that aborts the whole run; nothing is
//! deserialized from a failed worker.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use md_triage_core::{DiagnosticJob, validate_job};
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::error::{PipelineError, Result};

/// How to invoke one stage worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Stage label used in diagnostics and error reporting.
    pub label: String,
    /// Worker executable.
    pub program: PathBuf,
    /// Arguments, including the `--process-job` contract flag.
    pub args: Vec<String>,
    /// Extra environment entries set for the worker.
    pub env: Vec<(String, String)>,
    /// Optional deadline layered around the invocation by the caller. The
    /// protocol itself imposes none.
    pub timeout: Option<Duration>,
}

impl WorkerCommand {
    /// Creates a worker command with no extra environment or timeout.
    pub fn new(label: &str, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            label: label.to_string(),
            program: program.into(),
            args,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Adds one environment entry for the worker.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Layers a deadline around the invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Runs one stage worker over the given job record.
///
/// The caller serializes the record, delivers it over the worker's stdin,
/// and deserializes and validates the worker's stdout before handing the
/// record back. The worker's execution environment is provisioned
/// deterministically: its program directory is prepended to `PATH` so
/// sibling executables resolve, with no retries.
pub fn run_worker(command: &WorkerCommand, job: &DiagnosticJob) -> Result<DiagnosticJob> {
    let stage = command.label.clone();
    let payload = serde_json::to_string(job)?;

    debug!(stage = %stage, program = %command.program.display(), "Invoking stage worker");

    let mut invocation = Command::new(&command.program);
    invocation
        .args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(parent) = command.program.parent().filter(|p| !p.as_os_str().is_empty()) {
        let mut paths = vec![parent.to_path_buf()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        if let Ok(joined) = std::env::join_paths(paths) {
            invocation.env("PATH", joined);
        }
    }
    for (key, value) in &command.env {
        invocation.env(key, value);
    }

    let mut child = invocation.spawn().map_err(|source| PipelineError::WorkerSpawn {
        stage: stage.clone(),
        source,
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(payload.as_bytes())
            .map_err(|source| PipelineError::WorkerIo {
                stage: stage.clone(),
                source,
            })?;
        // Dropping stdin closes the pipe so the worker sees end of input.
    }

    let stdout_thread = child.stdout.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_thread = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });

    let collect = |thread: Option<std::thread::JoinHandle<Vec<u8>>>| {
        thread
            .and_then(|handle| handle.join().ok())
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    };

    let status = match command.timeout {
        Some(timeout) => match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::WorkerTimeout {
                    stage,
                    seconds: timeout.as_secs(),
                    stderr: collect(stderr_thread),
                });
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::WorkerIo { stage, source });
            }
        },
        None => child.wait().map_err(|source| PipelineError::WorkerIo {
            stage: stage.clone(),
            source,
        })?,
    };

    let stdout = collect(stdout_thread);
    let stderr = collect(stderr_thread);

    if !status.success() {
        return Err(PipelineError::WorkerFailed {
            stage,
            code: status.code(),
            stderr,
        });
    }

    let output = stdout.trim();
    if output.is_empty() {
        return Err(PipelineError::WorkerEmptyOutput { stage, stderr });
    }

    let updated: DiagnosticJob =
        serde_json::from_str(output).map_err(|error| PipelineError::WorkerMalformedOutput {
            stage: stage.clone(),
            detail: error.to_string(),
            stderr: stderr.clone(),
        })?;

    let violations = validate_job(&updated);
    if !violations.is_empty() {
        return Err(PipelineError::WorkerInvalidOutput { stage, violations });
    }

    info!(stage = %command.label, case = %updated.case_id, "Stage worker completed");
    Ok(updated)
}
