//! External converter and compiler invocation.
//!
//! Both tools are black boxes invoked with fixed, non-interactive flags.
//! Their stdout, stderr, and any on-disk log file are captured verbatim;
//! nothing here interprets the output.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Environment variable overriding the converter program.
pub const CONVERTER_ENV: &str = "MD_TRIAGE_CONVERTER";

/// Environment variable overriding the compiler program.
pub const COMPILER_ENV: &str = "MD_TRIAGE_COMPILER";

/// Environment variable overriding the per-tool timeout, in seconds.
pub const TOOL_TIMEOUT_ENV: &str = "MD_TRIAGE_TOOL_TIMEOUT_SECS";

const DEFAULT_CONVERTER: &str = "pandoc";
const DEFAULT_COMPILER: &str = "pdflatex";
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

/// Input format string requesting raw LaTeX passthrough and dollar math,
/// with automatic section identifiers disabled.
const CONVERTER_FORMAT: &str = "markdown-auto_identifiers+raw_tex+tex_math_dollars+implicit_figures";

/// Resolved external tool configuration, built once at stage start.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Converter program name or path.
    pub converter: String,
    /// Compiler program name or path.
    pub compiler: String,
    /// Deadline applied to each tool invocation.
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            converter: DEFAULT_CONVERTER.to_string(),
            compiler: DEFAULT_COMPILER.to_string(),
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

impl ToolConfig {
    /// Builds the configuration from the environment, falling back to the
    /// defaults. Read once; later environment changes have no effect.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = std::env::var(TOOL_TIMEOUT_ENV)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
        Self {
            converter: std::env::var(CONVERTER_ENV).unwrap_or(defaults.converter),
            compiler: std::env::var(COMPILER_ENV).unwrap_or(defaults.compiler),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// How one tool invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    /// The tool ran to completion with this exit code.
    Exited(i32),
    /// The tool exceeded the configured deadline and was killed.
    TimedOut,
    /// The tool process could not be started.
    SpawnFailed(String),
}

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub status: ToolStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolRun {
    /// Whether the tool completed with a zero exit code.
    pub fn succeeded(&self) -> bool {
        self.status == ToolStatus::Exited(0)
    }

    /// Stdout and stderr combined into one log blob.
    pub fn combined_log(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Runs the Markdown-to-TeX converter over `markdown_path`, writing to
/// `tex_path`.
pub fn run_converter(
    config: &ToolConfig,
    markdown_path: &Path,
    tex_path: &Path,
    work_dir: &Path,
) -> ToolRun {
    let args = vec![
        "-f".to_string(),
        CONVERTER_FORMAT.to_string(),
        "-t".to_string(),
        "latex".to_string(),
        "--standalone".to_string(),
        markdown_path.display().to_string(),
        "-o".to_string(),
        tex_path.display().to_string(),
    ];
    run_tool(&config.converter, &args, work_dir, config.timeout)
}

/// Runs the TeX-to-PDF compiler over `tex_path`, directing artifacts into
/// `output_dir`.
pub fn run_compiler(
    config: &ToolConfig,
    tex_path: &Path,
    output_dir: &Path,
) -> ToolRun {
    let args = vec![
        "-interaction=nonstopmode".to_string(),
        "-halt-on-error".to_string(),
        format!("-output-directory={}", output_dir.display()),
        tex_path.display().to_string(),
    ];
    run_tool(&config.compiler, &args, output_dir, config.timeout)
}

/// The compiler's on-disk log for a given TeX file, when it wrote one.
pub fn compiler_log_path(tex_path: &Path, output_dir: &Path) -> PathBuf {
    artifact_path(tex_path, output_dir, "log")
}

/// The PDF the compiler should have produced for a given TeX file.
pub fn output_pdf_path(tex_path: &Path, output_dir: &Path) -> PathBuf {
    artifact_path(tex_path, output_dir, "pdf")
}

fn artifact_path(tex_path: &Path, output_dir: &Path, extension: &str) -> PathBuf {
    let stem = tex_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    output_dir.join(format!("{stem}.{extension}"))
}

/// Spawns a tool with piped stdio and waits for it under a deadline.
fn run_tool(program: &str, args: &[String], work_dir: &Path, timeout: Duration) -> ToolRun {
    debug!(program, ?args, "Invoking external tool");

    let spawn = Command::new(program)
        .args(args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawn {
        Ok(child) => child,
        Err(error) => {
            warn!(program, error = %error, "Failed to spawn external tool");
            return ToolRun {
                status: ToolStatus::SpawnFailed(error.to_string()),
                stdout: String::new(),
                stderr: String::new(),
            };
        }
    };

    // Drain stdout and stderr on threads so a full pipe buffer cannot
    // deadlock the child before it exits.
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

    match child.wait_timeout(timeout) {
        Ok(Some(status)) => ToolRun {
            status: ToolStatus::Exited(status.code().unwrap_or(-1)),
            stdout: collect(stdout_thread),
            stderr: collect(stderr_thread),
        },
        Ok(None) => {
            warn!(program, timeout_secs = timeout.as_secs(), "Tool timed out; killing");
            let _ = child.kill();
            let _ = child.wait();
            ToolRun {
                status: ToolStatus::TimedOut,
                stdout: collect(stdout_thread),
                stderr: collect(stderr_thread),
            }
        }
        Err(error) => {
            let _ = child.kill();
            let _ = child.wait();
            ToolRun {
                status: ToolStatus::SpawnFailed(format!("wait failed: {error}")),
                stdout: collect(stdout_thread),
                stderr: collect(stderr_thread),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> tempfile::TempDir {
        tempfile::TempDir::new().expect("temp dir")
    }

    #[test]
    fn test_run_tool_captures_output_and_exit_code() {
        let dir = scratch();
        let run = run_tool(
            "sh",
            &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            dir.path(),
            Duration::from_secs(10),
        );
        assert_eq!(run.status, ToolStatus::Exited(3));
        assert_eq!(run.stdout.trim(), "out");
        assert_eq!(run.stderr.trim(), "err");
        assert!(!run.succeeded());
        assert!(run.combined_log().contains("out"));
        assert!(run.combined_log().contains("err"));
    }

    #[test]
    fn test_run_tool_reports_missing_program() {
        let dir = scratch();
        let run = run_tool(
            "definitely-not-an-installed-tool",
            &[],
            dir.path(),
            Duration::from_secs(1),
        );
        assert!(matches!(run.status, ToolStatus::SpawnFailed(_)));
    }

    #[test]
    fn test_run_tool_enforces_timeout() {
        let dir = scratch();
        let run = run_tool(
            "sh",
            &["-c".to_string(), "sleep 30".to_string()],
            dir.path(),
            Duration::from_millis(100),
        );
        assert_eq!(run.status, ToolStatus::TimedOut);
    }

    #[test]
    fn test_artifact_paths_follow_tex_stem() {
        let tex = Path::new("/scratch/input.tex");
        let out = Path::new("/scratch");
        assert_eq!(compiler_log_path(tex, out), Path::new("/scratch/input.log"));
        assert_eq!(output_pdf_path(tex, out), Path::new("/scratch/input.pdf"));
    }
}
