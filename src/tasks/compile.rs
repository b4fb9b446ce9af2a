//! Builds a checked-out version with its configured build commands.
//!
//! Misuses that ship correct usages also get their patterns built: the
//! usages are copied `pattern_frequency` times below
//! `checkouts/<project>/<version>/misuses/<misuse>/patterns-src/<n>/` and
//! compiled against the version's classes into the sibling
//! `patterns-classes/<n>/`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{prior_result, record_failure};
use crate::data::detector::shell_quote;
use crate::data::{Misuse, Project, ProjectVersion};
use crate::error::TaskError;
use crate::pipeline::{BenchmarkConfig, Markers, Task, TaskContext, TaskResult};
use crate::shell::ShellCommand;
use crate::utils::{copy_dir_recursive, reset_dir};

/// Marker name of the compile stage; later stages check it.
pub(crate) const COMPILE_TASK: &str = "compile";

/// Runs `build.commands` inside the checkout and builds the patterns.
pub struct CompileTask {
    config: BenchmarkConfig,
}

impl CompileTask {
    pub fn new(config: &BenchmarkConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Copies and compiles the patterns of one misuse.
    ///
    /// Returns `Some` with the recorded failure if the compiler failed.
    async fn compile_patterns(
        &self,
        version: &ProjectVersion,
        misuse: &Misuse,
        classpath: &Path,
        markers: &Markers,
        ctx: &TaskContext,
    ) -> Result<Option<TaskResult>, TaskError> {
        let sources = self.config.pattern_sources_dir(version, misuse);
        let classes = self.config.pattern_classes_dir(version, misuse);
        reset_dir(&sources)?;
        reset_dir(&classes)?;

        for copy in 0..self.config.pattern_frequency {
            let dir = sources.join(copy.to_string());
            for usage in misuse.correct_usages() {
                let target = dir.join(&usage.relative);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&usage.path, &target)?;
            }
        }

        // The copies are identical: compile the first, replicate its classes.
        let first = classes.join("0");
        fs::create_dir_all(&first)?;
        let files: Vec<String> = misuse
            .correct_usages()
            .iter()
            .map(|usage| shell_quote(&usage.relative))
            .collect();
        let command = format!(
            "{} -nowarn -encoding UTF-8 -d {} -cp {} {}",
            self.config.javac,
            shell_quote(&first.to_string_lossy()),
            shell_quote(&classpath.to_string_lossy()),
            files.join(" ")
        );

        let outcome = ShellCommand::new(command)
            .with_cwd(sources.join("0"))
            .with_timeout(self.config.compile_timeout)
            .with_log_dir(self.config.version_dir(version), format!("patterns-{}", misuse.misuse_id))
            .with_interrupt(ctx.interrupt.clone())
            .run()
            .await;
        if let Err(e) = outcome {
            warn!(misuse = %misuse.id, error = %e, "Pattern compilation failed");
            return record_failure(markers, e).map(Some);
        }

        for copy in 1..self.config.pattern_frequency {
            copy_dir_recursive(&first, &classes.join(copy.to_string()))?;
        }
        debug!(misuse = %misuse.id, copies = self.config.pattern_frequency, "Compiled patterns");
        Ok(None)
    }
}

#[async_trait]
impl Task for CompileTask {
    fn name(&self) -> &str {
        COMPILE_TASK
    }

    async fn run(
        &mut self,
        _project: &Project,
        version: &Arc<ProjectVersion>,
        ctx: &TaskContext,
    ) -> Result<TaskResult, TaskError> {
        let base = self.config.version_dir(version);
        let checkout = self.config.checkout_dir(version);
        if !checkout.is_dir() {
            return Ok(TaskResult::Failed("version is not checked out".to_string()));
        }

        let classes = checkout.join(&version.build.classes);
        let patterns: Vec<&Arc<Misuse>> = version
            .misuses()
            .iter()
            .filter(|misuse| misuse.has_correct_usages())
            .collect();
        let markers = Markers::new(&base, self.name());
        let has_output = (version.build.classes.is_empty() || classes.is_dir())
            && patterns
                .iter()
                .all(|misuse| self.config.pattern_classes_dir(version, misuse).is_dir());
        let force = self.config.force_compile;
        if let Some(result) = prior_result(&markers, force, has_output)? {
            return Ok(result);
        }

        if force && !version.build.classes.is_empty() && classes.exists() {
            reset_dir(&classes)?;
        }

        info!(commands = version.build.commands.len(), patterns = patterns.len(), "Compiling");
        for (index, command) in version.build.commands.iter().enumerate() {
            let outcome = ShellCommand::new(command)
                .with_cwd(&checkout)
                .with_timeout(self.config.compile_timeout)
                .with_log_dir(&base, format!("compile-{}", index + 1))
                .with_interrupt(ctx.interrupt.clone())
                .run()
                .await;
            if let Err(e) = outcome {
                warn!(error = %e, logs = %base.display(), "Compilation failed");
                return record_failure(&markers, e);
            }
        }

        for misuse in patterns {
            if let Some(failed) = self
                .compile_patterns(version, misuse, &classes, &markers, ctx)
                .await?
            {
                return Ok(failed);
            }
        }

        markers.mark_success()?;
        Ok(TaskResult::Completed)
    }
}
