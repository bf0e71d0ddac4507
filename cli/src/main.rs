use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use md_triage_core::DiagnosticJob;
use md_triage_pipeline::classify::classify_log;
use md_triage_pipeline::orchestrator::{Orchestrator, StageWorkers};
use md_triage_pipeline::scratch::RunScratch;
use md_triage_pipeline::stages::{self, StageId, internal_error_report};
use md_triage_pipeline::tools;

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[command(name = "md-triage")]
#[command(about = "Diagnose why a Markdown document fails to compile to PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read Markdown from stdin, run the diagnostic pipeline, print the report.
    Diagnose(DiagnoseArgs),
    /// Run one pipeline stage as a worker over a job record on stdin.
    Stage(StageArgs),
    /// Classify raw compiler log text without running the pipeline.
    ClassifyLog(ClassifyLogArgs),
}

#[derive(Debug, Args)]
struct DiagnoseArgs {
    /// Markdown-to-TeX converter program (default: pandoc).
    #[arg(long)]
    converter: Option<String>,
    /// TeX-to-PDF compiler program (default: pdflatex).
    #[arg(long)]
    compiler: Option<String>,
    /// Per-tool timeout in seconds.
    #[arg(long)]
    tool_timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
struct StageArgs {
    /// Stage to run: convert, investigate, resolve, or report.
    stage: String,
    /// Worker contract: read one job record from stdin, write the updated
    /// record to stdout, exit 0.
    #[arg(long)]
    process_job: bool,
}

#[derive(Debug, Args)]
struct ClassifyLogArgs {
    /// Read the log from this file instead of stdin.
    #[arg(long)]
    input: Option<PathBuf>,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Diagnose(args) => run_diagnose(args),
        Command::Stage(args) => run_stage(args),
        Command::ClassifyLog(args) => run_classify_log(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// The `DEBUG` toggle is read once at process start and controls only the
/// stderr log level, never control flow.
fn init_logging() {
    let level = if debug_enabled(std::env::var("DEBUG").ok()) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn debug_enabled(raw: Option<String>) -> bool {
    raw.map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn run_diagnose(args: DiagnoseArgs) -> Result<(), String> {
    let mut markdown = String::new();
    std::io::stdin()
        .read_to_string(&mut markdown)
        .map_err(|err| format!("Failed to read stdin: {err}"))?;
    if markdown.trim().is_empty() {
        return Err("No Markdown received on stdin".to_string());
    }

    // The scratch directory outlives every stage worker and is discarded
    // when this guard drops at process exit.
    let scratch = RunScratch::create()
        .map_err(|err| format!("Failed to create scratch directory: {err}"))?;
    let mut job = DiagnosticJob::new(&markdown);
    job.scratch_dir = Some(scratch.path().to_path_buf());

    let tool_timeout = args.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
    let mut workers = StageWorkers::for_current_exe()
        .map_err(|err| format!("Failed to locate the current executable: {err}"))?
        .with_convert_timeout(Duration::from_secs(tool_timeout * 2 + 30));
    if let Some(converter) = &args.converter {
        workers = workers.with_env(tools::CONVERTER_ENV, converter);
    }
    if let Some(compiler) = &args.compiler {
        workers = workers.with_env(tools::COMPILER_ENV, compiler);
    }
    if let Some(secs) = args.tool_timeout_secs {
        workers = workers.with_env(tools::TOOL_TIMEOUT_ENV, &secs.to_string());
    }

    match Orchestrator::new(workers).run(job) {
        Ok(done) => {
            println!("{}", done.final_report.unwrap_or_default());
            Ok(())
        }
        Err(error) => {
            // A hard abort still produces a report, clearly marked as the
            // tool's own failure, and exits non-zero.
            println!("{}", internal_error_report(&error));
            Err(error.to_string())
        }
    }
}

fn run_stage(args: StageArgs) -> Result<(), String> {
    if !args.process_job {
        return Err("stage workers must be invoked with --process-job".to_string());
    }
    let stage = StageId::parse(&args.stage).ok_or_else(|| {
        format!(
            "Unknown stage '{}'; expected convert, investigate, resolve, or report",
            args.stage
        )
    })?;

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .map_err(|err| format!("Failed to read job record from stdin: {err}"))?;
    let job: DiagnosticJob = serde_json::from_str(&raw)
        .map_err(|err| format!("Malformed job record on stdin: {err}"))?;

    let updated = stages::run_stage(stage, job).map_err(|err| err.to_string())?;
    let out = serde_json::to_string(&updated)
        .map_err(|err| format!("Failed to serialize job record: {err}"))?;
    println!("{out}");
    Ok(())
}

fn run_classify_log(args: ClassifyLogArgs) -> Result<(), String> {
    let log = match &args.input {
        Some(path) => fs::read_to_string(path)
            .map_err(|err| format!("Failed to read '{}': {err}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|err| format!("Failed to read stdin: {err}"))?;
            raw
        }
    };

    let result = classify_log(&log);
    let json = serde_json::to_string_pretty(&result)
        .map_err(|err| format!("Failed to serialize classification: {err}"))?;
    println!("{json}");
    Ok(())
}
