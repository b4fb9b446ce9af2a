//! Runs a detector on a compiled version.
//!
//! The detector is invoked once per execution of the version's run and must
//! write `findings.yml` into its output directory:
//!
//! ```text
//! [java <java-options> -jar] <executable>
//!     --target <src-dir> --classes <classes-dir>
//!     --output <findings-dir> --findings-file findings.yml
//!     --timeout <secs>
//!     [--misuse <id> --patterns <pattern-src-dir> --pattern-classes <pattern-classes-dir>]
//!     [--detector-option key=value ...]
//! ```
//!
//! Before a run only the files the detector owns are removed from the output
//! directory, so reviewed results and the per-misuse directories of
//! detect-only runs survive. The version's `result.csv` is dropped once the
//! detector has run again.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::data::{
    build_filter, load_findings, Detector, DetectorMode, Execution, ExecutionKind,
    ExecutionResult, Project, ProjectVersion, Run, FINDINGS_FILE, RESULT_FILE, RUN_FILE,
};
use crate::error::{ShellError, TaskError};
use crate::pipeline::{BenchmarkConfig, MarkerState, Markers, Task, TaskContext, TaskResult};
use crate::shell::ShellCommand;

use super::compile::COMPILE_TASK;

/// Label of the detector's stdout/stderr logs.
const LOG_LABEL: &str = "detect";

/// Removes the previous output of a detector run from `dir`.
fn clear_detector_output(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let logs = [format!("{LOG_LABEL}.stdout.log"), format!("{LOG_LABEL}.stderr.log")];
    let owned = [FINDINGS_FILE, RUN_FILE].into_iter().chain(logs.iter().map(String::as_str));
    for name in owned {
        remove_if_exists(&dir.join(name))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Builds the run of `detector` on `version` for the configured mode.
///
/// Mine-and-detect yields one execution over the whole version. Detect-only
/// yields one execution per misuse that ships correct usages.
pub fn plan_run(
    config: &BenchmarkConfig,
    detector: &Arc<Detector>,
    version: &Arc<ProjectVersion>,
) -> Run {
    let results_dir = config.results_dir(&detector.name, version);
    let executions = match config.detector_mode {
        DetectorMode::MineAndDetect => vec![Execution::mine_and_detect(
            Arc::clone(detector),
            Arc::clone(version),
            results_dir,
            build_filter(config.min_confidence, config.potential_hits, version.misuses()),
        )],
        DetectorMode::DetectOnly => version
            .misuses()
            .iter()
            .filter(|misuse| misuse.has_correct_usages())
            .map(|misuse| {
                Execution::detect_only(
                    Arc::clone(detector),
                    Arc::clone(version),
                    Arc::clone(misuse),
                    results_dir.join(&misuse.misuse_id),
                    build_filter(
                        config.min_confidence,
                        config.potential_hits,
                        std::slice::from_ref(misuse),
                    ),
                )
            })
            .collect(),
    };
    Run::new(executions)
}

/// Invokes the detector and persists each execution's outcome.
pub struct DetectTask {
    config: BenchmarkConfig,
    detector: Arc<Detector>,
}

impl DetectTask {
    pub fn new(config: &BenchmarkConfig, detector: Arc<Detector>) -> Self {
        Self {
            config: config.clone(),
            detector,
        }
    }

    /// Command-line arguments for one execution.
    fn arguments(&self, execution: &Execution, checkout: &Path) -> Vec<String> {
        let build = &execution.version.build;
        let mut args = vec![
            "--target".to_string(),
            checkout.join(&build.src).display().to_string(),
            "--classes".to_string(),
            checkout.join(&build.classes).display().to_string(),
            "--output".to_string(),
            execution.findings_dir().display().to_string(),
            "--findings-file".to_string(),
            FINDINGS_FILE.to_string(),
            "--timeout".to_string(),
            self.config.detect_timeout.as_secs().to_string(),
        ];
        if let ExecutionKind::DetectOnly { ref misuse } = execution.kind {
            args.push("--misuse".to_string());
            args.push(misuse.id.clone());
            args.push("--patterns".to_string());
            args.push(
                self.config
                    .pattern_sources_dir(&execution.version, misuse)
                    .display()
                    .to_string(),
            );
            args.push("--pattern-classes".to_string());
            args.push(
                self.config
                    .pattern_classes_dir(&execution.version, misuse)
                    .display()
                    .to_string(),
            );
        }
        for option in &self.config.detector_options {
            args.push("--detector-option".to_string());
            args.push(option.clone());
        }
        args
    }

    /// Runs the detector for one execution and records the outcome.
    async fn execute(
        &self,
        execution: &mut Execution,
        checkout: &Path,
        ctx: &TaskContext,
    ) -> Result<(), TaskError> {
        clear_detector_output(execution.findings_dir())?;

        let command = self
            .detector
            .command_line(&self.config.java_options, &self.arguments(execution, checkout));
        info!(execution = %execution.id(), "Running detector");

        let start = Instant::now();
        let outcome = ShellCommand::new(command)
            .with_timeout(self.config.detect_timeout)
            .with_log_dir(execution.findings_dir(), LOG_LABEL)
            .with_interrupt(ctx.interrupt.clone())
            .run()
            .await;
        let runtime = start.elapsed();

        let (result, message) = match outcome {
            Ok(_) => match load_findings(&execution.findings_path()) {
                Ok(findings) => (ExecutionResult::Success, format!("{} findings", findings.len())),
                Err(e) => (ExecutionResult::Error, e.to_string()),
            },
            Err(e) if e.is_timeout() => (ExecutionResult::Timeout, e.to_string()),
            Err(e) if e.is_operational() => (ExecutionResult::Error, e.to_string()),
            Err(ShellError::Interrupted { .. }) => return Err(TaskError::Interrupted),
            Err(e) => return Err(e.into()),
        };

        match result {
            ExecutionResult::Success => info!(?runtime, %message, "Detector finished"),
            _ => warn!(%result, %message, logs = %execution.findings_dir().display(), "Detector failed"),
        }

        if !execution.complete(result, runtime, message) {
            return Err(TaskError::Internal {
                task: self.name().to_string(),
                version: execution.version.id.clone(),
                reason: format!("execution {} completed twice", execution.id()),
            });
        }
        execution.save_record()?;
        Ok(())
    }
}

#[async_trait]
impl Task for DetectTask {
    fn name(&self) -> &str {
        "detect"
    }

    async fn run(
        &mut self,
        _project: &Project,
        version: &Arc<ProjectVersion>,
        ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError> {
        let compiled = Markers::new(&self.config.version_dir(version), COMPILE_TASK).state()?;
        if compiled != MarkerState::Succeeded {
            return Ok(TaskResult::Failed("version is not compiled".to_string()));
        }
        let checkout = self.config.checkout_dir(version);

        let mut run = plan_run(&self.config, &self.detector, version);
        if run.is_empty() {
            info!(mode = %self.config.detector_mode, "Nothing to detect for this version");
            return Ok(TaskResult::Skipped);
        }

        let mut attempted = false;
        for execution in &mut run.executions {
            if !self.config.force_detect && execution.load_record()? {
                debug!(execution = %execution.id(), result = ?execution.result(), "Reusing previous detector run");
                continue;
            }
            attempted = true;
            self.execute(execution, &checkout, ctx).await?;
        }

        if attempted {
            // Rows evaluated from the replaced findings no longer apply.
            remove_if_exists(
                &self
                    .config
                    .results_dir(&self.detector.name, version)
                    .join(RESULT_FILE),
            )?;
            info!(runtime_secs = run.runtime_secs(), result = ?run.result(), "Detector run finished");
        }

        if run.is_success() {
            return Ok(if attempted {
                TaskResult::Completed
            } else {
                TaskResult::Skipped
            });
        }

        let failed: Vec<String> = run
            .executions
            .iter()
            .filter(|e| e.is_failure())
            .map(|e| format!("{} {}: {}", e.id(), e.result().map_or("none".to_string(), |r| r.to_string()), e.message()))
            .collect();
        Ok(TaskResult::Failed(failed.join("; ")))
    }
}
