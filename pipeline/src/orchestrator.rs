//! Pipeline orchestration.
//!
//! The orchestrator is a state machine over the job record's flags. After
//! every stage it inspects only the record itself to decide what runs next,
//! so replaying the same record is deterministic; the orchestrator holds no
//! hidden state of its own. Any worker-contract violation aborts the whole
//! run, with no retries and no stage skipping.

use std::path::PathBuf;
use std::time::Duration;

use md_triage_core::{DiagnosticJob, JobOutcome, PipelineStage};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::stages::StageId;
use crate::worker::{WorkerCommand, run_worker};

/// Builds the worker command for each pipeline stage.
///
/// Every stage is invoked as `<program> stage <id> --process-job`; by
/// default `program` is the current executable, so the pipeline re-enters
/// its own binary in worker mode. The convert stage may carry a deadline,
/// since it is the one most exposed to unbounded external tools.
#[derive(Debug, Clone)]
pub struct StageWorkers {
    program: PathBuf,
    env: Vec<(String, String)>,
    convert_timeout: Option<Duration>,
}

impl StageWorkers {
    /// Stage workers invoked through the given program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            env: Vec::new(),
            convert_timeout: None,
        }
    }

    /// Stage workers that re-invoke the current executable.
    pub fn for_current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    /// Adds an environment entry passed to every stage worker.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Layers a deadline around the convert stage's invocation.
    pub fn with_convert_timeout(mut self, timeout: Duration) -> Self {
        self.convert_timeout = Some(timeout);
        self
    }

    /// The worker command for one stage.
    pub fn command_for(&self, stage: StageId) -> WorkerCommand {
        let mut command = WorkerCommand::new(
            stage.as_str(),
            self.program.clone(),
            vec![
                "stage".to_string(),
                stage.as_str().to_string(),
                "--process-job".to_string(),
            ],
        );
        for (key, value) in &self.env {
            command = command.with_env(key, value);
        }
        if stage == StageId::Convert {
            if let Some(timeout) = self.convert_timeout {
                command = command.with_timeout(timeout);
            }
        }
        command
    }
}

/// Drives one job through the stage workers to completion.
pub struct Orchestrator {
    workers: StageWorkers,
}

impl Orchestrator {
    pub fn new(workers: StageWorkers) -> Self {
        Self { workers }
    }

    /// Runs the job through every required stage and returns the terminal
    /// record.
    ///
    /// Fail-fast: the first worker-contract violation aborts the run. On
    /// success the returned job is at [`PipelineStage::Complete`] with a
    /// populated final report.
    pub fn run(&self, mut job: DiagnosticJob) -> Result<DiagnosticJob> {
        while let Some(stage) = next_stage(&job) {
            info!(case = %job.case_id, stage = %stage, "Entering stage");
            job.pipeline_stage = stage_marker(stage);

            let command = self.workers.command_for(stage);
            job = run_worker(&command, &job)?;
            // Stages never move the marker; reassert it over whatever the
            // worker echoed back.
            job.pipeline_stage = stage_marker(stage);

            if next_stage(&job) == Some(StageId::Report) {
                enforce_explained_outcome(&mut job);
            }
        }

        if job.final_report.is_none() {
            return Err(PipelineError::MissingFinalReport);
        }
        job.pipeline_stage = PipelineStage::Complete;
        info!(case = %job.case_id, outcome = ?job.outcome, "Pipeline complete");
        Ok(job)
    }
}

/// Decides which stage runs next, from the record's flags alone.
///
/// Returns `None` once the report stage has run.
pub fn next_stage(job: &DiagnosticJob) -> Option<StageId> {
    match job.pipeline_stage {
        PipelineStage::Intake => Some(StageId::Convert),
        PipelineStage::Convert => {
            if investigation_required(job) {
                Some(StageId::Investigate)
            } else if resolve_required(job) {
                Some(StageId::Resolve)
            } else {
                Some(StageId::Report)
            }
        }
        PipelineStage::Investigate => {
            if resolve_required(job) {
                Some(StageId::Resolve)
            } else {
                Some(StageId::Report)
            }
        }
        PipelineStage::Resolve => Some(StageId::Report),
        PipelineStage::Report | PipelineStage::Complete => None,
    }
}

/// Investigation runs only when conversion worked but compilation did not.
/// A conversion failure skips it: the convert stage has already produced
/// its own leads.
fn investigation_required(job: &DiagnosticJob) -> bool {
    job.conversion_succeeded
        && job.compilation_attempted
        && !job.compilation_succeeded
        && job.outcome == Some(JobOutcome::CompilationFailed)
}

fn resolve_required(job: &DiagnosticJob) -> bool {
    !job.leads.is_empty() && job.outcome != Some(JobOutcome::Success)
}

/// A non-success outcome must never reach the report stage with zero leads
/// and no explanation; such records are forced to the manual-review outcome.
pub fn enforce_explained_outcome(job: &mut DiagnosticJob) {
    if job.leads.is_empty() && job.outcome != Some(JobOutcome::Success) {
        warn!(
            case = %job.case_id,
            outcome = ?job.outcome,
            "Non-success outcome with no leads; forcing manual review"
        );
        job.outcome = Some(JobOutcome::NoActionableLeads);
    }
}

fn stage_marker(stage: StageId) -> PipelineStage {
    match stage {
        StageId::Convert => PipelineStage::Convert,
        StageId::Investigate => PipelineStage::Investigate,
        StageId::Resolve => PipelineStage::Resolve,
        StageId::Report => PipelineStage::Report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use md_triage_core::{Lead, Remedy};

    fn job_after_convert(
        conversion_ok: bool,
        compilation_ok: bool,
        outcome: JobOutcome,
    ) -> DiagnosticJob {
        let mut job = DiagnosticJob::new("# doc\n");
        job.pipeline_stage = PipelineStage::Convert;
        job.conversion_attempted = true;
        job.conversion_succeeded = conversion_ok;
        job.compilation_attempted = conversion_ok;
        job.compilation_succeeded = compilation_ok;
        job.outcome = Some(outcome);
        job
    }

    #[test]
    fn test_fresh_job_starts_with_convert() {
        let job = DiagnosticJob::new("# doc\n");
        assert_eq!(next_stage(&job), Some(StageId::Convert));
    }

    #[test]
    fn test_full_success_skips_straight_to_report() {
        let job = job_after_convert(true, true, JobOutcome::Success);
        assert_eq!(next_stage(&job), Some(StageId::Report));
    }

    #[test]
    fn test_compile_failure_triggers_investigation() {
        let job = job_after_convert(true, false, JobOutcome::CompilationFailed);
        assert_eq!(next_stage(&job), Some(StageId::Investigate));
    }

    #[test]
    fn test_conversion_failure_skips_investigation() {
        let mut job = job_after_convert(false, false, JobOutcome::ConversionFailed);
        job.leads.push(Lead::new("convert", "Conversion failed"));
        assert_eq!(next_stage(&job), Some(StageId::Resolve));
    }

    #[test]
    fn test_investigation_with_leads_proceeds_to_resolve() {
        let mut job = job_after_convert(true, false, JobOutcome::LeadsFound);
        job.pipeline_stage = PipelineStage::Investigate;
        job.leads.push(Lead::new("investigate", "problem"));
        assert_eq!(next_stage(&job), Some(StageId::Resolve));
    }

    #[test]
    fn test_investigation_without_leads_skips_resolve() {
        let mut job = job_after_convert(true, false, JobOutcome::NoActionableLeads);
        job.pipeline_stage = PipelineStage::Investigate;
        assert_eq!(next_stage(&job), Some(StageId::Report));
    }

    #[test]
    fn test_resolve_always_leads_to_report_and_report_terminates() {
        let mut job = DiagnosticJob::new("# doc\n");
        job.pipeline_stage = PipelineStage::Resolve;
        assert_eq!(next_stage(&job), Some(StageId::Report));
        job.pipeline_stage = PipelineStage::Report;
        assert_eq!(next_stage(&job), None);
        job.pipeline_stage = PipelineStage::Complete;
        assert_eq!(next_stage(&job), None);
    }

    #[test]
    fn test_next_stage_is_deterministic_on_replay() {
        let job = job_after_convert(true, false, JobOutcome::CompilationFailed);
        assert_eq!(next_stage(&job), next_stage(&job.clone()));
    }

    #[test]
    fn test_enforce_explained_outcome_forces_manual_review() {
        let mut job = job_after_convert(true, false, JobOutcome::CompilationFailed);
        enforce_explained_outcome(&mut job);
        assert_eq!(job.outcome, Some(JobOutcome::NoActionableLeads));

        let mut success = job_after_convert(true, true, JobOutcome::Success);
        enforce_explained_outcome(&mut success);
        assert_eq!(success.outcome, Some(JobOutcome::Success));

        let mut explained = job_after_convert(false, false, JobOutcome::ConversionFailed);
        explained.leads.push(Lead::new("convert", "problem"));
        enforce_explained_outcome(&mut explained);
        assert_eq!(explained.outcome, Some(JobOutcome::ConversionFailed));
    }

    #[test]
    fn test_convert_timeout_applies_only_to_convert() {
        let workers = StageWorkers::new("md-triage")
            .with_convert_timeout(Duration::from_secs(5))
            .with_env("DEBUG", "true");
        let convert = workers.command_for(StageId::Convert);
        assert_eq!(convert.timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            convert.args,
            vec!["stage".to_string(), "convert".to_string(), "--process-job".to_string()]
        );
        assert!(convert.env.contains(&("DEBUG".to_string(), "true".to_string())));

        let report = workers.command_for(StageId::Report);
        assert_eq!(report.timeout, None);
        assert_eq!(report.args[1], "report");
    }

    // ---- scripted-worker tests -------------------------------------------
    //
    // The worker script dispatches on the stage id and answers with canned
    // job records written by the test, so orchestration is exercised without
    // any TeX toolchain. The report case rewrites whatever it receives,
    // preserving orchestrator-side mutations such as the forced outcome.

    struct ScriptedWorkers {
        dir: tempfile::TempDir,
    }

    impl ScriptedWorkers {
        fn new() -> Self {
            Self {
                dir: tempfile::TempDir::new().expect("temp dir"),
            }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn canned(&self, stage: &str, job: &DiagnosticJob) {
            let raw = serde_json::to_string(job).expect("canned job serializes");
            fs::write(self.path().join(format!("{stage}.json")), raw).expect("write canned job");
        }

        fn install(&self, extra_cases: &str) -> StageWorkers {
            // Each case consumes stdin itself: canned answers drain it to
            // /dev/null, the sed-based report case filters it directly.
            let dir = self.path().display();
            let script = format!(
                "#!/bin/sh\n\
                 echo \"$2\" >> {dir}/invocations.log\n\
                 case \"$2\" in\n\
                 {extra_cases}\n\
                   *) cat > /dev/null; cat {dir}/$2.json ;;\n\
                 esac\n"
            );
            let path = self.path().join("worker.sh");
            fs::write(&path, script).expect("write worker script");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            }
            StageWorkers::new(path)
        }

        fn install_with_echo_report(&self) -> StageWorkers {
            // The report worker adds a final report to the record it was
            // handed instead of answering from a canned file.
            self.install(
                "  report) sed 's/^{/{\"final_report\":\"assembled report\",/' ;;",
            )
        }

        fn invocations(&self) -> Vec<String> {
            fs::read_to_string(self.path().join("invocations.log"))
                .unwrap_or_default()
                .lines()
                .map(ToOwned::to_owned)
                .collect()
        }
    }

    #[test]
    fn test_successful_compile_runs_convert_then_report_only() {
        let scripted = ScriptedWorkers::new();
        scripted.canned(
            "convert",
            &job_after_convert(true, true, JobOutcome::Success),
        );
        let workers = scripted.install_with_echo_report();

        let out = Orchestrator::new(workers)
            .run(DiagnosticJob::new("# doc\n"))
            .unwrap();

        assert_eq!(scripted.invocations(), vec!["convert", "report"]);
        assert_eq!(out.pipeline_stage, PipelineStage::Complete);
        assert_eq!(out.outcome, Some(JobOutcome::Success));
        assert_eq!(out.final_report.as_deref(), Some("assembled report"));
    }

    #[test]
    fn test_compile_failure_runs_all_four_stages_in_order() {
        let scripted = ScriptedWorkers::new();
        scripted.canned(
            "convert",
            &job_after_convert(true, false, JobOutcome::CompilationFailed),
        );

        let mut investigated = job_after_convert(true, false, JobOutcome::LeadsFound);
        let lead = Lead::new("investigate", "Undefined control sequence");
        let lead_id = lead.id.clone();
        investigated.leads.push(lead);
        scripted.canned("investigate", &investigated);

        let mut resolved = investigated.clone();
        resolved
            .remedies
            .push(Remedy::new(&lead_id, "resolve", "why", "how"));
        resolved.outcome = Some(JobOutcome::RemediesProvided);
        scripted.canned("resolve", &resolved);

        let workers = scripted.install_with_echo_report();
        let out = Orchestrator::new(workers)
            .run(DiagnosticJob::new("# doc\n"))
            .unwrap();

        assert_eq!(
            scripted.invocations(),
            vec!["convert", "investigate", "resolve", "report"]
        );
        assert_eq!(out.outcome, Some(JobOutcome::RemediesProvided));
        assert!(out.final_report.is_some());
    }

    #[test]
    fn test_unexplained_failure_is_forced_to_manual_review() {
        let scripted = ScriptedWorkers::new();
        // Tool failure with no leads: investigation is not applicable, and
        // the record must not reach the report stage unexplained.
        scripted.canned(
            "convert",
            &job_after_convert(true, false, JobOutcome::ToolFailure),
        );
        let workers = scripted.install_with_echo_report();

        let out = Orchestrator::new(workers)
            .run(DiagnosticJob::new("# doc\n"))
            .unwrap();

        assert_eq!(scripted.invocations(), vec!["convert", "report"]);
        assert_eq!(out.outcome, Some(JobOutcome::NoActionableLeads));
    }

    #[test]
    fn test_worker_failure_aborts_before_later_stages() {
        let scripted = ScriptedWorkers::new();
        let workers = scripted.install(
            "  convert) cat > /dev/null; echo 'conversion kaput' >&2; exit 7 ;;",
        );

        let error = Orchestrator::new(workers)
            .run(DiagnosticJob::new("# doc\n"))
            .unwrap_err();

        match error {
            PipelineError::WorkerFailed { stage, code, stderr } => {
                assert_eq!(stage, "convert");
                assert_eq!(code, Some(7));
                assert!(stderr.contains("conversion kaput"));
            }
            other => panic!("expected WorkerFailed, got {other:?}"),
        }
        assert_eq!(scripted.invocations(), vec!["convert"]);
    }

    #[test]
    fn test_report_without_final_report_is_fatal() {
        let scripted = ScriptedWorkers::new();
        scripted.canned(
            "convert",
            &job_after_convert(true, true, JobOutcome::Success),
        );
        // `cat` echoes the record unchanged, leaving the report missing.
        let workers = scripted.install("  report) cat ;;");

        let error = Orchestrator::new(workers)
            .run(DiagnosticJob::new("# doc\n"))
            .unwrap_err();
        assert!(matches!(error, PipelineError::MissingFinalReport));
    }
}
