//! Materializes a version's sources under `checkouts/<project>/<version>/checkout/`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::compile::COMPILE_TASK;
use super::{prior_result, record_failure};
use crate::data::detector::shell_quote;
use crate::data::{Project, ProjectVersion, RepositoryKind};
use crate::error::TaskError;
use crate::pipeline::{BenchmarkConfig, Markers, Task, TaskContext, TaskResult};
use crate::shell::ShellCommand;
use crate::utils::{copy_dir_recursive, reset_dir};

/// Checks out a version from git, svn or a synthetic source directory.
pub struct CheckoutTask {
    checkouts_path: PathBuf,
    timeout: Duration,
    force: bool,
}

impl CheckoutTask {
    pub fn new(config: &BenchmarkConfig) -> Self {
        Self {
            checkouts_path: config.checkouts_path.clone(),
            timeout: config.checkout_timeout,
            force: config.force_checkout,
        }
    }

    /// Shell commands fetching the version into the (empty) working directory.
    fn commands(version: &ProjectVersion) -> Vec<(&'static str, String)> {
        let url = shell_quote(&version.repository.url);
        let revision = shell_quote(&version.revision);
        match version.repository.kind {
            RepositoryKind::Git => vec![
                ("clone", format!("git clone --quiet {} .", url)),
                ("checkout", format!("git checkout --quiet {}", revision)),
            ],
            RepositoryKind::Svn => vec![(
                "checkout",
                format!(
                    "svn checkout --quiet {}",
                    shell_quote(&format!("{}@{}", version.repository.url, version.revision))
                ),
            )],
            RepositoryKind::Synthetic => Vec::new(),
        }
    }
}

#[async_trait]
impl Task for CheckoutTask {
    fn name(&self) -> &str {
        "checkout"
    }

    async fn run(
        &mut self,
        project: &Project,
        version: &Arc<ProjectVersion>,
        ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError> {
        let base = self
            .checkouts_path
            .join(&version.project_id)
            .join(&version.version_id);
        let target = base.join("checkout");
        let markers = Markers::new(&base, self.name());

        if let Some(result) = prior_result(&markers, self.force, target.is_dir())? {
            return Ok(result);
        }

        info!(
            repository = %version.repository.kind,
            url = %version.repository.url,
            revision = %version.revision,
            "Checking out"
        );
        reset_dir(&target)?;
        // A build of the replaced sources no longer applies.
        Markers::new(&base, COMPILE_TASK).clear()?;

        if version.repository.kind == RepositoryKind::Synthetic {
            let source = project.path.join(&version.repository.url);
            if !source.is_dir() {
                let reason = format!("synthetic source '{}' does not exist", source.display());
                warn!(%reason, "Checkout failed");
                markers.mark_failed(&reason)?;
                return Ok(TaskResult::Failed(reason));
            }
            copy_dir_recursive(&source, &target)?;
        }

        for (label, command) in Self::commands(version) {
            let outcome = ShellCommand::new(command)
                .with_cwd(&target)
                .with_timeout(self.timeout)
                .with_env("GIT_TERMINAL_PROMPT", "0")
                .with_log_dir(&base, label)
                .with_interrupt(ctx.interrupt.clone())
                .run()
                .await;
            if let Err(e) = outcome {
                warn!(error = %e, logs = %base.display(), "Checkout failed");
                return record_failure(&markers, e);
            }
        }

        markers.mark_success()?;
        Ok(TaskResult::Completed)
    }
}
