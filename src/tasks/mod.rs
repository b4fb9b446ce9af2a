//! Benchmark stages.
//!
//! Each stage is a [`Task`](crate::pipeline::Task) applied per version by the
//! [`TaskRunner`](crate::pipeline::TaskRunner):
//!
//! - **checkout**: materializes the version's sources
//! - **compile**: runs the version's build commands
//! - **detect**: invokes the detector and records each execution's outcome
//! - **eval**: classifies findings against the documented misuses
//! - **stats**: calculators reporting over the corpus and result tables
//!
//! `check` and `visualize` are not per-version stages and run on their own.

pub mod check;
pub mod checkout;
pub mod compile;
pub mod detect;
pub mod evaluate;
pub mod stats;
pub mod visualize;

pub use check::{check_prerequisites, Prerequisite, PrerequisiteStatus, PREREQUISITES};
pub use checkout::CheckoutTask;
pub use compile::CompileTask;
pub use detect::{plan_run, DetectTask};
pub use evaluate::{evaluate_execution, finding_matches, EvaluateTask};
pub use stats::{calculator_names, create_calculator};
pub use visualize::visualize;

use crate::error::{ShellError, TaskError};
use crate::pipeline::{MarkerState, Markers, TaskResult};

/// Decides from the markers of a previous attempt whether work can be skipped.
///
/// Forcing forgets the previous attempt. A recorded failure is reported again
/// without re-running the external tool.
pub(crate) fn prior_result(
    markers: &Markers,
    force: bool,
    output_present: bool,
) -> Result<Option<TaskResult>, TaskError> {
    if force {
        markers.clear()?;
        return Ok(None);
    }
    match markers.state()? {
        MarkerState::Succeeded if output_present => Ok(Some(TaskResult::Skipped)),
        MarkerState::Failed(reason) => Ok(Some(TaskResult::Failed(format!(
            "previous attempt failed: {}",
            reason
        )))),
        _ => Ok(None),
    }
}

/// Records an operational command failure, or propagates anything else.
pub(crate) fn record_failure(markers: &Markers, error: ShellError) -> Result<TaskResult, TaskError> {
    if !error.is_operational() {
        return Err(match error {
            ShellError::Interrupted { .. } => TaskError::Interrupted,
            other => other.into(),
        });
    }
    let reason = error.to_string();
    markers.mark_failed(&reason)?;
    Ok(TaskResult::Failed(reason))
}
