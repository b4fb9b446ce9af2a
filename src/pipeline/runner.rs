//! Task runner applying the benchmark stages to every project version.
//!
//! Versions are processed one at a time, end to end. Each registered task runs
//! in registration order; a task that reports [`TaskResult::Failed`] stops the
//! remaining chain for that version only. An `Err` from a task is a defect or
//! a user interrupt and halts the whole run.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use super::config::BenchmarkConfig;
use super::markers::mark_ignored;
use crate::data::{discover_projects, Project, ProjectVersion};
use crate::error::TaskError;
use crate::shell::Interrupt;

/// Outcome of one task on one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TaskResult {
    /// Work was done.
    Completed,
    /// Output from a previous run was reused.
    Skipped,
    /// An expected operational failure; later tasks do not run for this version.
    Failed(String),
}

impl TaskResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskResult::Failed(_))
    }
}

/// State shared by every task of a run.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub interrupt: Interrupt,
}

impl TaskContext {
    pub fn new(interrupt: Interrupt) -> Self {
        Self { interrupt }
    }
}

/// One pipeline stage applied per version.
#[async_trait]
pub trait Task: Send {
    /// Name used in logs and marker files.
    fn name(&self) -> &str;

    /// Processes one version.
    async fn run(
        &mut self,
        project: &Project,
        version: &Arc<ProjectVersion>,
        ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError>;

    /// Called once after every version was processed.
    async fn end(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Selects the versions a run processes.
#[derive(Debug, Clone, Default)]
pub struct VersionFilter {
    white_list: Vec<String>,
    black_list: Vec<String>,
}

impl VersionFilter {
    /// Entries are project ids or `project.version` ids.
    pub fn new(white_list: Vec<String>, black_list: Vec<String>) -> Self {
        Self {
            white_list,
            black_list,
        }
    }

    /// Returns true if some version of the project may be admitted.
    pub fn admits_project(&self, project_id: &str) -> bool {
        if self.black_list.iter().any(|id| id == project_id) {
            return false;
        }
        self.white_list.is_empty()
            || self
                .white_list
                .iter()
                .any(|id| id == project_id || id.starts_with(&format!("{project_id}.")))
    }

    /// Returns true if the version is selected. The black list wins.
    pub fn admits(&self, version: &ProjectVersion) -> bool {
        let matches = |id: &String| *id == version.project_id || *id == version.id;
        if self.black_list.iter().any(matches) {
            return false;
        }
        self.white_list.is_empty() || self.white_list.iter().any(matches)
    }
}

/// A failed task, as reported in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct VersionFailure {
    pub version: String,
    pub task: String,
    pub reason: String,
}

/// Summary of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunnerReport {
    /// Versions the tasks were applied to.
    pub processed: usize,
    /// Versions whose whole chain succeeded or was reused.
    pub succeeded: usize,
    /// Versions excluded by their `ignore` flag.
    pub ignored: Vec<String>,
    pub failures: Vec<VersionFailure>,
    /// True when fail-fast stopped the run early.
    pub aborted: bool,
}

impl RunnerReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Applies an ordered chain of tasks to every selected version.
pub struct TaskRunner {
    data_path: PathBuf,
    checkouts_path: PathBuf,
    filter: VersionFilter,
    fail_fast: bool,
    tasks: Vec<Box<dyn Task>>,
}

impl TaskRunner {
    /// Creates a runner with no tasks.
    pub fn new(config: &BenchmarkConfig) -> Self {
        Self {
            data_path: config.data_path.clone(),
            checkouts_path: config.checkouts_path.clone(),
            filter: VersionFilter::new(config.white_list.clone(), config.black_list.clone()),
            fail_fast: config.fail_fast,
            tasks: Vec::new(),
        }
    }

    /// Appends a task to the chain.
    pub fn add(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    /// Builder form of [`TaskRunner::add`].
    pub fn with_task(mut self, task: Box<dyn Task>) -> Self {
        self.add(task);
        self
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Runs the chain over the corpus.
    ///
    /// # Errors
    ///
    /// Returns `TaskError` on a harness defect or a user interrupt. Task
    /// failures are collected in the report instead.
    pub async fn run(&mut self, ctx: &TaskContext) -> Result<RunnerReport, TaskError> {
        let mut report = RunnerReport::default();
        info!(tasks = ?self.task_names(), data = %self.data_path.display(), "Starting run");

        'projects: for project in discover_projects(&self.data_path)? {
            if !self.filter.admits_project(&project.id) {
                debug!(project = %project.id, "Project not selected");
                continue;
            }

            for version in project.versions()? {
                if !self.filter.admits(&version) {
                    debug!(version = %version.id, "Version not selected");
                    continue;
                }
                if ctx.interrupt.is_triggered() {
                    return Err(TaskError::Interrupted);
                }

                if version.is_ignored() {
                    let dir = self.checkouts_path.join(&version.project_id).join(&version.version_id);
                    mark_ignored(&dir)?;
                    info!(version = %version.id, "Version is ignored");
                    report.ignored.push(version.id.clone());
                    continue;
                }

                report.processed += 1;
                let version = Arc::new(version);
                match self.run_version(&project, &version, ctx).await? {
                    None => report.succeeded += 1,
                    Some(failure) => {
                        report.failures.push(failure);
                        if self.fail_fast {
                            warn!("Fail-fast enabled, stopping run");
                            report.aborted = true;
                            break 'projects;
                        }
                    }
                }
            }
        }

        for task in &mut self.tasks {
            let span = info_span!("end", task = %task.name());
            task.end(ctx).instrument(span).await?;
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            ignored = report.ignored.len(),
            "Run finished"
        );
        Ok(report)
    }

    /// Runs the chain on one version, returning the first failure.
    #[instrument(name = "version", skip_all, fields(id = %version.id))]
    async fn run_version(
        &mut self,
        project: &Project,
        version: &Arc<ProjectVersion>,
        ctx: &TaskContext,
    ) -> Result<Option<VersionFailure>, TaskError> {
        for task in &mut self.tasks {
            if ctx.interrupt.is_triggered() {
                return Err(TaskError::Interrupted);
            }

            let name = task.name().to_string();
            let span = info_span!("task", name = %name);
            let result = task.run(project, version, ctx).instrument(span).await?;
            match result {
                TaskResult::Completed => debug!(task = %name, "Task completed"),
                TaskResult::Skipped => debug!(task = %name, "Task skipped, output exists"),
                TaskResult::Failed(reason) => {
                    warn!(task = %name, %reason, "Task failed, skipping remaining tasks");
                    return Ok(Some(VersionFailure {
                        version: version.id.clone(),
                        task: name,
                        reason,
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{synthetic_corpus, write_version};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the versions it sees and fails on a chosen one.
    struct Recorder {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
        ended: Arc<Mutex<bool>>,
    }

    impl Recorder {
        fn new(name: &str, seen: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                seen: Arc::clone(seen),
                fail_on: None,
                ended: Arc::new(Mutex::new(false)),
            }
        }

        fn failing_on(mut self, version: &str) -> Self {
            self.fail_on = Some(version.to_string());
            self
        }
    }

    #[async_trait]
    impl Task for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(
            &mut self,
            _project: &Project,
            version: &Arc<ProjectVersion>,
            _ctx: &TaskContext,
        ) -> Result<TaskResult, TaskError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, version.id));
            if self.fail_on.as_deref() == Some(version.id.as_str()) {
                return Ok(TaskResult::Failed("boom".to_string()));
            }
            Ok(TaskResult::Completed)
        }

        async fn end(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
            *self.ended.lock().unwrap() = true;
            Ok(())
        }
    }

    fn corpus(temp: &TempDir) -> BenchmarkConfig {
        let data = temp.path().join("data");
        synthetic_corpus(&data);
        write_version(&data, "p", "2", "revision: 2\nmisuses: []\n");
        write_version(&data, "p", "3", "revision: 3\nmisuses: []\nignore: true\n");
        BenchmarkConfig::default()
            .with_data_path(&data)
            .with_checkouts_path(temp.path().join("checkouts"))
    }

    #[test]
    fn test_version_filter() {
        let temp = TempDir::new().unwrap();
        let config = corpus(&temp);
        let project = Project::load(&config.data_path, "p").unwrap();
        let versions = project.versions().unwrap();

        let all = VersionFilter::default();
        assert!(versions.iter().all(|v| all.admits(v)));

        let white = VersionFilter::new(vec!["p.2".to_string()], vec![]);
        assert!(white.admits_project("p"));
        assert!(!white.admits(&versions[0]));
        assert!(white.admits(&versions[1]));

        let both = VersionFilter::new(vec!["p".to_string()], vec!["p.2".to_string()]);
        assert!(both.admits(&versions[0]));
        assert!(!both.admits(&versions[1]));

        let black = VersionFilter::new(vec!["p.1".to_string()], vec!["p".to_string()]);
        assert!(!black.admits_project("p"));
        assert!(!black.admits(&versions[0]));
    }

    #[tokio::test]
    async fn test_tasks_run_in_order_per_version() {
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut runner = TaskRunner::new(&corpus(&temp))
            .with_task(Box::new(Recorder::new("a", &seen)))
            .with_task(Box::new(Recorder::new("b", &seen)));

        let report = runner.run(&TaskContext::default()).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:p.1", "b:p.1", "a:p.2", "b:p.2"]
        );
        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.ignored, vec!["p.3"]);
        assert!(temp.path().join("checkouts/p/3/.ignored").is_file());
    }

    #[tokio::test]
    async fn test_failure_aborts_chain_for_version_only() {
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut runner = TaskRunner::new(&corpus(&temp))
            .with_task(Box::new(Recorder::new("a", &seen).failing_on("p.1")))
            .with_task(Box::new(Recorder::new("b", &seen)));

        let report = runner.run(&TaskContext::default()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a:p.1", "a:p.2", "b:p.2"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].version, "p.1");
        assert_eq!(report.failures[0].task, "a");
        assert!(!report.aborted);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_run() {
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let config = corpus(&temp).with_fail_fast(true);
        let mut runner =
            TaskRunner::new(&config).with_task(Box::new(Recorder::new("a", &seen).failing_on("p.1")));

        let report = runner.run(&TaskContext::default()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a:p.1"]);
        assert!(report.aborted);
    }

    #[tokio::test]
    async fn test_end_hook_runs() {
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder::new("a", &seen);
        let ended = Arc::clone(&recorder.ended);
        let mut runner = TaskRunner::new(&corpus(&temp)).with_task(Box::new(recorder));

        runner.run(&TaskContext::default()).await.unwrap();
        assert!(*ended.lock().unwrap());
    }

    #[tokio::test]
    async fn test_interrupt_halts_run() {
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (tx, interrupt) = Interrupt::channel();
        tx.send(true).unwrap();

        let mut runner = TaskRunner::new(&corpus(&temp)).with_task(Box::new(Recorder::new("a", &seen)));
        let result = runner.run(&TaskContext::new(interrupt)).await;
        assert!(matches!(result, Err(TaskError::Interrupted)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_task_result_serialization() {
        let json = serde_json::to_string(&TaskResult::Failed("x".to_string())).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"x"}"#);
    }
}
