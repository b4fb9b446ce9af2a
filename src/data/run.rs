//! Aggregate outcome of all executions of one detector on one version.

use super::execution::{Execution, ExecutionResult};

/// The executions of one detector on one project version.
///
/// A run with no executions, or with no completed execution, is neither a
/// success nor a failure.
#[derive(Debug, Clone, Default)]
pub struct Run {
    pub executions: Vec<Execution>,
}

impl Run {
    pub fn new(executions: Vec<Execution>) -> Self {
        Self { executions }
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// True if there is at least one execution and every execution succeeded.
    pub fn is_success(&self) -> bool {
        !self.executions.is_empty() && self.executions.iter().all(Execution::is_success)
    }

    /// True if any execution ended in error or timeout.
    pub fn is_failure(&self) -> bool {
        self.executions.iter().any(Execution::is_failure)
    }

    pub fn is_error(&self) -> bool {
        self.executions.iter().any(Execution::is_error)
    }

    pub fn is_timeout(&self) -> bool {
        self.executions.iter().any(Execution::is_timeout)
    }

    /// Summed runtime of all executions.
    pub fn runtime_secs(&self) -> f64 {
        self.executions
            .iter()
            .map(|e| e.runtime().as_secs_f64())
            .sum()
    }

    /// The most severe result across executions, if any ran.
    pub fn result(&self) -> Option<ExecutionResult> {
        if self.is_timeout() {
            Some(ExecutionResult::Timeout)
        } else if self.is_error() {
            Some(ExecutionResult::Error)
        } else if self.is_success() {
            Some(ExecutionResult::Success)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::execution::tests::{dummy_detector, synthetic_version};
    use crate::data::filters::AllFindings;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn execution(temp: &TempDir, result: Option<ExecutionResult>) -> Execution {
        let mut execution = Execution::mine_and_detect(
            dummy_detector(),
            synthetic_version(temp),
            temp.path().join("results"),
            Arc::new(AllFindings),
        );
        if let Some(result) = result {
            assert!(execution.complete(result, Duration::from_secs(1), ""));
        }
        execution
    }

    fn assert_all_false(run: &Run) {
        assert!(!run.is_success());
        assert!(!run.is_failure());
        assert!(!run.is_error());
        assert!(!run.is_timeout());
        assert_eq!(run.result(), None);
    }

    #[test]
    fn test_empty_run_is_neither_success_nor_failure() {
        assert_all_false(&Run::default());
    }

    #[test]
    fn test_not_run_executions_are_neither_success_nor_failure() {
        let temp = TempDir::new().unwrap();
        let run = Run::new(vec![execution(&temp, None), execution(&temp, None)]);
        assert_all_false(&run);
    }

    #[test]
    fn test_all_success() {
        let temp = TempDir::new().unwrap();
        let run = Run::new(vec![
            execution(&temp, Some(ExecutionResult::Success)),
            execution(&temp, Some(ExecutionResult::Success)),
        ]);
        assert!(run.is_success());
        assert!(!run.is_failure());
        assert_eq!(run.runtime_secs(), 2.0);
    }

    #[test]
    fn test_single_error_fails_run() {
        let temp = TempDir::new().unwrap();
        let run = Run::new(vec![
            execution(&temp, Some(ExecutionResult::Success)),
            execution(&temp, Some(ExecutionResult::Error)),
        ]);
        assert!(run.is_error());
        assert!(run.is_failure());
        assert!(!run.is_success());
        assert!(!run.is_timeout());
    }

    #[test]
    fn test_timeout_dominates_result() {
        let temp = TempDir::new().unwrap();
        let run = Run::new(vec![
            execution(&temp, Some(ExecutionResult::Error)),
            execution(&temp, Some(ExecutionResult::Timeout)),
        ]);
        assert!(run.is_timeout());
        assert_eq!(run.result(), Some(ExecutionResult::Timeout));
    }

    #[test]
    fn test_partial_run() {
        let temp = TempDir::new().unwrap();
        let run = Run::new(vec![
            execution(&temp, Some(ExecutionResult::Success)),
            execution(&temp, None),
        ]);
        assert!(!run.is_success());
        assert!(!run.is_failure());

        let run = Run::new(vec![
            execution(&temp, Some(ExecutionResult::Error)),
            execution(&temp, None),
        ]);
        assert!(run.is_failure());
    }
}
