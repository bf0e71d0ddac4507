//! Integration tests driving the built `md-triage` binary: the classify-log
//! utility, the stage worker contract, and end-to-end diagnosis with shell
//! stand-ins for the external converter and compiler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use md_triage_core::{DiagnosticJob, JobOutcome, Lead};

fn md_triage_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_md-triage"))
}

/// Runs the binary with the given args, feeding `stdin_data` to stdin.
fn run_with_stdin(args: &[&str], envs: &[(&str, &str)], stdin_data: &str) -> Output {
    let mut child = Command::new(md_triage_bin())
        .args(args)
        .envs(envs.iter().map(|(key, value)| (*key, *value)))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn md-triage");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(stdin_data.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for md-triage")
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("failed to write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// A converter stand-in that writes a minimal valid TeX document to the
/// `-o` target, ignoring the input.
fn fake_converter(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-pandoc.sh",
        r#"#!/bin/sh
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
cat > "$out" <<'EOF'
\documentclass{article}
\begin{document}
Hello
\end{document}
EOF
"#,
    )
}

/// A compiler stand-in that fails, leaving an undefined-control-sequence
/// log next to where the PDF would have gone.
fn failing_compiler(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-pdflatex-fail.sh",
        r#"#!/bin/sh
outdir="."
for a in "$@"; do
  case "$a" in
    -output-directory=*) outdir="${a#-output-directory=}" ;;
  esac
done
cat > "$outdir/input.log" <<'EOF'
This is pdfTeX
! Undefined control sequence.
<recently read> \badmacro
l.3 \badmacro
EOF
exit 1
"#,
    )
}

/// A compiler stand-in that succeeds: success log plus a non-empty PDF.
fn succeeding_compiler(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-pdflatex-ok.sh",
        r#"#!/bin/sh
outdir="."
for a in "$@"; do
  case "$a" in
    -output-directory=*) outdir="${a#-output-directory=}" ;;
  esac
done
echo "Output written on input.pdf (1 page, 1234 bytes)." > "$outdir/input.log"
echo "%PDF-1.4 fake" > "$outdir/input.pdf"
exit 0
"#,
    )
}

// ---- classify-log ----

#[test]
fn test_classify_log_empty_input_is_no_error_identified() {
    let output = run_with_stdin(&["classify-log"], &[], "");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("invalid JSON: {e}\n{stdout}"));
    assert_eq!(parsed["signature"], "no_error_identified");
    assert!(parsed["source_line"].is_null());
}

#[test]
fn test_classify_log_file_input_finds_signature_and_line() {
    let dir = tempfile::TempDir::new().unwrap();
    let log_path = dir.path().join("compile.log");
    std::fs::write(
        &log_path,
        "This is pdfTeX\n! Undefined control sequence.\n<recently read> \\badmacro\nl.42 \\badmacro\n",
    )
    .unwrap();

    let output = run_with_stdin(
        &["classify-log", "--input", log_path.to_str().unwrap()],
        &[],
        "",
    );
    assert!(
        output.status.success(),
        "classify-log failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("invalid JSON output");
    assert_eq!(parsed["signature"], "undefined_control_sequence");
    assert_eq!(parsed["source_line"], 42);
}

#[test]
fn test_classify_log_is_stable_over_repeated_invocations() {
    let log = "! Missing $ inserted.\n<inserted text>\nl.7 x = 2\n";
    let first = run_with_stdin(&["classify-log"], &[], log);
    let second = run_with_stdin(&["classify-log"], &[], log);
    assert!(first.status.success() && second.status.success());
    assert_eq!(first.stdout, second.stdout);
}

// ---- stage worker contract ----

#[test]
fn test_stage_report_populates_final_report() {
    let mut job = DiagnosticJob::new("# doc\n");
    job.outcome = Some(JobOutcome::Success);
    let payload = serde_json::to_string(&job).unwrap();

    let output = run_with_stdin(&["stage", "report", "--process-job"], &[], &payload);
    assert!(
        output.status.success(),
        "report stage failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let updated: DiagnosticJob = serde_json::from_slice(&output.stdout).expect("one job record");
    assert!(updated.final_report.is_some());
    assert!(updated.final_report.unwrap().contains("compiles cleanly"));
}

#[test]
fn test_stage_resolve_gives_every_lead_a_remedy() {
    let mut job = DiagnosticJob::new("# doc\n");
    job.leads.push(Lead::new("investigate", "strange failure"));
    job.outcome = Some(JobOutcome::LeadsFound);
    let payload = serde_json::to_string(&job).unwrap();

    let output = run_with_stdin(&["stage", "resolve", "--process-job"], &[], &payload);
    assert!(output.status.success());

    let updated: DiagnosticJob = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(updated.outcome, Some(JobOutcome::RemediesProvided));
    for lead in &updated.leads {
        assert!(!updated.remedies_for(&lead.id).is_empty());
    }
}

#[test]
fn test_stage_convert_turns_failing_converter_into_leads() {
    let job = DiagnosticJob::new("# doc\n\nbroken $math line\n");
    let payload = serde_json::to_string(&job).unwrap();

    let output = run_with_stdin(
        &["stage", "convert", "--process-job"],
        &[("MD_TRIAGE_CONVERTER", "false")],
        &payload,
    );
    assert!(output.status.success());

    let updated: DiagnosticJob = serde_json::from_slice(&output.stdout).unwrap();
    assert!(updated.conversion_attempted);
    assert!(!updated.conversion_succeeded);
    assert_eq!(updated.outcome, Some(JobOutcome::ConversionFailed));
    assert!(!updated.leads.is_empty());
}

#[test]
fn test_stage_convert_reports_missing_tool_as_tool_failure() {
    let job = DiagnosticJob::new("# doc\n");
    let payload = serde_json::to_string(&job).unwrap();

    let output = run_with_stdin(
        &["stage", "convert", "--process-job"],
        &[("MD_TRIAGE_CONVERTER", "definitely-not-an-installed-tool")],
        &payload,
    );
    assert!(output.status.success());

    let updated: DiagnosticJob = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(updated.outcome, Some(JobOutcome::ToolFailure));
    assert!(!updated.leads.is_empty());
}

#[test]
fn test_stage_rejects_unknown_stage_id() {
    let output = run_with_stdin(&["stage", "frobnicate", "--process-job"], &[], "{}");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown stage"));
}

#[test]
fn test_stage_requires_process_job_flag() {
    let output = run_with_stdin(&["stage", "report"], &[], "");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--process-job"));
}

#[test]
fn test_stage_rejects_malformed_job_record() {
    let output = run_with_stdin(
        &["stage", "investigate", "--process-job"],
        &[],
        "this is not a job record",
    );
    assert!(!output.status.success());
}

// ---- end-to-end diagnose ----

#[test]
fn test_diagnose_reports_success_for_clean_compile() {
    let dir = tempfile::TempDir::new().unwrap();
    let converter = fake_converter(dir.path());
    let compiler = succeeding_compiler(dir.path());

    let output = run_with_stdin(
        &[
            "diagnose",
            "--converter",
            converter.to_str().unwrap(),
            "--compiler",
            compiler.to_str().unwrap(),
        ],
        &[],
        "# Hello\n\nJust text.\n",
    );
    assert!(
        output.status.success(),
        "diagnose failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("compiles cleanly"));
    assert!(!stdout.contains("Issues found"));
}

#[test]
fn test_diagnose_reports_issues_and_fixes_for_compile_failure() {
    let dir = tempfile::TempDir::new().unwrap();
    let converter = fake_converter(dir.path());
    let compiler = failing_compiler(dir.path());

    let output = run_with_stdin(
        &[
            "diagnose",
            "--converter",
            converter.to_str().unwrap(),
            "--compiler",
            compiler.to_str().unwrap(),
        ],
        &[],
        "# Hello\n\n\\badmacro{x}\n",
    );
    // A failure report is still a produced report: exit code 0.
    assert!(
        output.status.success(),
        "diagnose failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Issues found"));
    assert!(stdout.contains("Undefined control sequence"));
    assert!(stdout.contains("Suggested fixes"));
    assert!(stdout.contains("Fix:"));
}

#[test]
fn test_diagnose_rejects_empty_stdin() {
    let output = run_with_stdin(&["diagnose"], &[], "");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No Markdown"));
}
