//! Verifies that the external tools the benchmark drives are installed.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ShellError, TaskError};
use crate::shell::{Interrupt, ShellCommand};

const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// An external tool and the command printing its version.
#[derive(Debug, Clone, Copy)]
pub struct Prerequisite {
    pub name: &'static str,
    pub version_command: &'static str,
    pub required: bool,
}

/// Tools used by checkout, compile and java-based detectors.
pub const PREREQUISITES: &[Prerequisite] = &[
    Prerequisite {
        name: "git",
        version_command: "git --version",
        required: true,
    },
    Prerequisite {
        name: "java",
        version_command: "java -version",
        required: true,
    },
    Prerequisite {
        name: "svn",
        version_command: "svn --version --quiet",
        required: false,
    },
    Prerequisite {
        name: "mvn",
        version_command: "mvn --version",
        required: false,
    },
    Prerequisite {
        name: "gradle",
        version_command: "gradle --version",
        required: false,
    },
];

/// Version check outcome for one tool.
#[derive(Debug, Clone, Serialize)]
pub struct PrerequisiteStatus {
    pub name: String,
    pub required: bool,
    /// First line of the version output; `None` if the tool is unavailable.
    pub version: Option<String>,
}

impl PrerequisiteStatus {
    pub fn is_available(&self) -> bool {
        self.version.is_some()
    }
}

/// Asks every tool for its version and fails if a required one is missing.
///
/// # Errors
///
/// Returns `TaskError::MissingPrerequisite` naming the missing required tools,
/// or `TaskError::Interrupted` on Ctrl-C.
pub async fn check_prerequisites(
    prerequisites: &[Prerequisite],
    interrupt: &Interrupt,
) -> Result<Vec<PrerequisiteStatus>, TaskError> {
    let mut statuses = Vec::with_capacity(prerequisites.len());
    for prerequisite in prerequisites {
        let outcome = ShellCommand::new(prerequisite.version_command)
            .with_timeout(VERSION_TIMEOUT)
            .with_interrupt(interrupt.clone())
            .run()
            .await;

        let version = match outcome {
            Ok(output) => {
                // java prints its version to stderr.
                let text = if output.stdout.trim().is_empty() {
                    output.stderr
                } else {
                    output.stdout
                };
                Some(text.lines().next().unwrap_or_default().trim().to_string())
            }
            Err(ShellError::Interrupted { .. }) => return Err(TaskError::Interrupted),
            Err(e) if e.is_operational() => None,
            Err(e) => return Err(e.into()),
        };

        match version {
            Some(ref v) => info!(tool = prerequisite.name, version = %v, "Found"),
            None if prerequisite.required => warn!(tool = prerequisite.name, "Required tool missing"),
            None => info!(tool = prerequisite.name, "Optional tool missing"),
        }
        statuses.push(PrerequisiteStatus {
            name: prerequisite.name.to_string(),
            required: prerequisite.required,
            version,
        });
    }

    let missing: Vec<&str> = statuses
        .iter()
        .filter(|s| s.required && !s.is_available())
        .map(|s| s.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(TaskError::MissingPrerequisite(missing.join(", ")));
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_available_tool() {
        let tools = [Prerequisite {
            name: "sh",
            version_command: "echo 'sh 1.0'",
            required: true,
        }];
        let statuses = check_prerequisites(&tools, &Interrupt::never()).await.unwrap();
        assert_eq!(statuses[0].version.as_deref(), Some("sh 1.0"));
    }

    #[tokio::test]
    async fn test_missing_optional_tool_is_reported() {
        let tools = [Prerequisite {
            name: "nonexistent",
            version_command: "nonexistent-tool-4f2a --version",
            required: false,
        }];
        let statuses = check_prerequisites(&tools, &Interrupt::never()).await.unwrap();
        assert!(!statuses[0].is_available());
    }

    #[tokio::test]
    async fn test_missing_required_tool_fails() {
        let tools = [
            Prerequisite {
                name: "nonexistent",
                version_command: "nonexistent-tool-4f2a --version",
                required: true,
            },
            Prerequisite {
                name: "sh",
                version_command: "echo ok",
                required: true,
            },
        ];
        let err = check_prerequisites(&tools, &Interrupt::never()).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required tool: nonexistent");
    }

    #[tokio::test]
    async fn test_version_from_stderr() {
        let tools = [Prerequisite {
            name: "java",
            version_command: "echo 'openjdk version \"17\"' >&2",
            required: true,
        }];
        let statuses = check_prerequisites(&tools, &Interrupt::never()).await.unwrap();
        assert_eq!(statuses[0].version.as_deref(), Some("openjdk version \"17\""));
    }
}
