//! Classifies detector findings against the documented misuses.
//!
//! A finding hits a misuse when it points at the same file and method and,
//! if both sides name APIs, at least one API is shared. Every misuse yields
//! one row: `TP` with the first hitting finding, or `FN`. Findings that hit
//! no misuse yield `FP` rows with an empty misuse column.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::info;

use super::detect::plan_run;
use crate::data::{
    same_file, to_csv, Classification, Detector, Execution, Finding, Misuse, Project,
    ProjectVersion, ResultRow, RESULT_FILE,
};
use crate::error::{DataError, TaskError};
use crate::pipeline::{BenchmarkConfig, Task, TaskContext, TaskResult};
use crate::utils::{is_newer, write_atomic};

/// Writes `result.csv` for a version from its successful detector run.
pub struct EvaluateTask {
    config: BenchmarkConfig,
    detector: Arc<Detector>,
}

impl EvaluateTask {
    pub fn new(config: &BenchmarkConfig, detector: Arc<Detector>) -> Self {
        Self {
            config: config.clone(),
            detector,
        }
    }
}

#[async_trait]
impl Task for EvaluateTask {
    fn name(&self) -> &str {
        "eval"
    }

    async fn run(
        &mut self,
        _project: &Project,
        version: &Arc<ProjectVersion>,
        _ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError> {
        let result_path = self
            .config
            .results_dir(&self.detector.name, version)
            .join(RESULT_FILE);

        let mut run = plan_run(&self.config, &self.detector, version);
        if run.is_empty() {
            info!(mode = %self.config.detector_mode, "Nothing to evaluate for this version");
            return Ok(TaskResult::Skipped);
        }
        for execution in &mut run.executions {
            execution.load_record()?;
        }
        if !run.is_success() {
            let state = run.result().map_or("not run".to_string(), |r| r.to_string());
            return Ok(TaskResult::Failed(format!(
                "no successful detector run to evaluate ({})",
                state
            )));
        }

        let records: Vec<_> = run.executions.iter().map(Execution::record_path).collect();
        if !self.config.force_eval && is_newer(&result_path, &records) {
            return Ok(TaskResult::Skipped);
        }

        let mut rows = Vec::new();
        for execution in &run.executions {
            rows.extend(evaluate_execution(execution)?);
        }
        write_atomic(&result_path, to_csv(&rows))?;

        let count = |c: Classification| rows.iter().filter(|r| r.classification == c).count();
        info!(
            tp = count(Classification::TruePositive),
            fp = count(Classification::FalsePositive),
            fn_ = count(Classification::FalseNegative),
            "Evaluated findings"
        );
        Ok(TaskResult::Completed)
    }
}

/// Classifies the filtered findings of one completed execution.
pub fn evaluate_execution(execution: &Execution) -> Result<Vec<ResultRow>, DataError> {
    let findings = execution.findings()?;
    let version = &execution.version;
    let row = |misuse: &str, classification, finding: &str| ResultRow {
        detector: execution.detector.name.clone(),
        project: version.project_id.clone(),
        version: version.version_id.clone(),
        misuse: misuse.to_string(),
        classification,
        finding: finding.to_string(),
    };

    let mut matched = vec![false; findings.len()];
    let mut rows = Vec::new();
    for misuse in execution.misuses() {
        let mut first_hit = None;
        for (index, finding) in findings.iter().enumerate() {
            if finding_matches(finding, &misuse) {
                matched[index] = true;
                first_hit.get_or_insert(index);
            }
        }
        rows.push(match first_hit {
            Some(index) => row(&misuse.misuse_id, Classification::TruePositive, &findings[index].id),
            None => row(&misuse.misuse_id, Classification::FalseNegative, ""),
        });
    }

    for (finding, _) in findings.iter().zip(&matched).filter(|(_, hit)| !**hit) {
        rows.push(row("", Classification::FalsePositive, &finding.id));
    }
    Ok(rows)
}

/// Returns true if `finding` points at `misuse`.
pub fn finding_matches(finding: &Finding, misuse: &Misuse) -> bool {
    if !same_file(&finding.file, &misuse.location.file) {
        return false;
    }
    if method_name(&finding.method) != method_name(&misuse.location.method) {
        return false;
    }
    finding.apis.is_empty()
        || misuse.apis.is_empty()
        || finding
            .apis
            .iter()
            .any(|a| misuse.apis.iter().any(|b| same_api(a, b)))
}

/// Reduces a method signature such as `a.B.m(java.lang.String)` to `m`.
fn method_name(signature: &str) -> &str {
    static SIGNATURE: OnceLock<Regex> = OnceLock::new();
    let re = SIGNATURE.get_or_init(|| {
        Regex::new(r"^\s*(?:[^(]*\.)?([^.(\s]+)\s*(?:\(.*\))?\s*$")
            .expect("Invalid regex for method signatures")
    });
    re.captures(signature)
        .and_then(|caps| caps.get(1))
        .map_or(signature.trim(), |m| m.as_str())
}

/// Compares type names, allowing one side to be unqualified.
fn same_api(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }
    if left.contains('.') && right.contains('.') {
        return false;
    }
    let simple = |name: &str| name.rsplit('.').next().unwrap_or(name).to_string();
    simple(left) == simple(right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::execution::tests::{dummy_detector, synthetic_version};
    use crate::data::{AllFindings, DetectorMode, ExecutionResult, FINDINGS_FILE};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn completed(temp: &TempDir, findings: &str) -> Execution {
        let dir = temp.path().join("results");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(FINDINGS_FILE), findings).unwrap();
        let mut execution = Execution::mine_and_detect(
            dummy_detector(),
            synthetic_version(temp),
            &dir,
            Arc::new(AllFindings),
        );
        assert!(execution.complete(ExecutionResult::Success, Duration::ZERO, ""));
        execution
    }

    async fn evaluate(temp: &TempDir, config: BenchmarkConfig) -> TaskResult {
        let version = synthetic_version(temp);
        let project = Project::load(temp.path(), "p").unwrap();
        let mut task = EvaluateTask::new(&config, dummy_detector());
        task.run(&project, &version, &TaskContext::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_version_without_detect_only_executions_is_skipped() {
        let temp = TempDir::new().unwrap();
        let config = BenchmarkConfig::default()
            .with_results_path(temp.path().join("results"))
            .with_detector_mode(DetectorMode::DetectOnly);

        assert_eq!(evaluate(&temp, config).await, TaskResult::Skipped);
        assert!(!temp.path().join("results").exists());
    }

    #[tokio::test]
    async fn test_missing_detector_run_fails() {
        let temp = TempDir::new().unwrap();
        let config = BenchmarkConfig::default().with_results_path(temp.path().join("results"));

        let result = evaluate(&temp, config).await;
        assert!(matches!(result, TaskResult::Failed(ref reason) if reason.contains("not run")));
    }

    #[test]
    fn test_method_name() {
        assert_eq!(method_name("m()"), "m");
        assert_eq!(method_name("a.B.m(java.lang.String, int)"), "m");
        assert_eq!(method_name("<init>(int)"), "<init>");
        assert_eq!(method_name("run"), "run");
    }

    #[test]
    fn test_same_api() {
        assert!(same_api("java.util.Iterator", "java.util.Iterator"));
        assert!(same_api("Iterator", "java.util.Iterator"));
        assert!(!same_api("java.util.Iterator", "com.acme.Iterator"));
    }

    #[test]
    fn test_zero_findings_yield_one_false_negative() {
        let temp = TempDir::new().unwrap();
        let execution = completed(&temp, "");
        assert_eq!(execution.misuses()[0].location.line, 42);

        let rows = evaluate_execution(&execution).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].classification, Classification::FalseNegative);
        assert_eq!(rows[0].misuse, "m1");
        assert_eq!(rows[0].finding, "");
    }

    #[test]
    fn test_hit_and_false_positive() {
        let temp = TempDir::new().unwrap();
        let execution = completed(
            &temp,
            "- id: hit\n  file: p/src/A.java\n  method: m()\n  apis: [Iterator]\n\
             - id: other-method\n  file: src/A.java\n  method: n()\n\
             - id: other-api\n  file: src/A.java\n  method: m()\n  apis: [java.io.File]\n",
        );

        let rows = evaluate_execution(&execution).unwrap();
        let summary: Vec<_> = rows
            .iter()
            .map(|r| (r.misuse.as_str(), r.classification, r.finding.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("m1", Classification::TruePositive, "hit"),
                ("", Classification::FalsePositive, "other-method"),
                ("", Classification::FalsePositive, "other-api"),
            ]
        );
    }
}
