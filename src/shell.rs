//! External command execution with hard timeouts.
//!
//! Every external tool the benchmark drives (version control, build tools,
//! detectors) goes through [`ShellCommand`]. Commands run via `sh -c` in their
//! own process group so that a timeout or a user interrupt can terminate the
//! whole subprocess tree, not just the shell.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ShellError;

/// Grace period for draining output pipes once the process group is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured result of a command that exited on its own.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code of the process (-1 if killed by a signal).
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl CommandOutput {
    /// Checks if the command exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Handle observing the user interrupt (Ctrl-C).
///
/// Cloned into every command so an interrupt kills the in-flight subprocess
/// immediately instead of waiting for its timeout.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

impl Interrupt {
    /// Installs a Ctrl-C listener and returns a handle to it.
    pub fn listen() -> Self {
        let (tx, interrupt) = Self::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, terminating running commands");
                let _ = tx.send(true);
            }
        });
        interrupt
    }

    /// Creates a handle that is triggered manually through the returned sender.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// Creates a handle that never fires.
    pub fn never() -> Self {
        let (_, interrupt) = Self::channel();
        interrupt
    }

    /// Returns true once the interrupt has fired.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the interrupt fires; pends forever if it never can.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::never()
    }
}

/// A shell command with a working directory, timeout and optional log files.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    command: String,
    cwd: Option<PathBuf>,
    timeout: Duration,
    env_vars: Vec<(String, String)>,
    log: Option<(PathBuf, String)>,
    interrupt: Interrupt,
}

enum Outcome {
    Exited(std::process::ExitStatus),
    TimedOut,
    Interrupted,
}

impl ShellCommand {
    /// Creates a new command with a 30 minute default timeout.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout: Duration::from_secs(1800),
            env_vars: Vec::new(),
            log: None,
            interrupt: Interrupt::never(),
        }
    }

    /// Sets the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Sets the hard wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Writes captured output to `<dir>/<label>.stdout.log` and `<dir>/<label>.stderr.log`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        self.log = Some((dir.into(), label.into()));
        self
    }

    /// Attaches the user interrupt handle.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The command line as passed to `sh -c`.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the command to completion, timeout or interrupt.
    ///
    /// Non-zero exits map to [`ShellError::NonZeroExit`], an exceeded budget to
    /// [`ShellError::Timeout`] and Ctrl-C to [`ShellError::Interrupted`]. In the
    /// latter two cases the whole process group is killed before returning.
    pub async fn run(&self) -> Result<CommandOutput, ShellError> {
        let start = Instant::now();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(command = %self.command, cwd = ?self.cwd, timeout = ?self.timeout, "Executing");

        let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let pid = child.id();
        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = tokio::spawn(read_stream(child.stdout.take(), Arc::clone(&stdout_buf)));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take(), Arc::clone(&stderr_buf)));

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status?),
            _ = tokio::time::sleep(self.timeout) => Outcome::TimedOut,
            _ = self.interrupt.triggered() => Outcome::Interrupted,
        };

        // Members left behind by a clean exit (forked daemons, background jobs)
        // would otherwise hold the output pipes open.
        kill_process_group(pid);
        if !matches!(outcome, Outcome::Exited(_)) {
            if let Err(e) = child.kill().await {
                debug!("Process already gone: {}", e);
            }
        }

        let stdout = drain(stdout_task, &stdout_buf).await;
        let stderr = drain(stderr_task, &stderr_buf).await;
        let duration = start.elapsed();

        if let Some((ref dir, ref label)) = self.log {
            write_logs(dir, label, &stdout, &stderr)?;
        }

        match outcome {
            Outcome::Exited(status) => {
                let exit_code = status.code().unwrap_or(-1);
                debug!(command = %self.command, exit_code, ?duration, "Command finished");
                if exit_code == 0 {
                    Ok(CommandOutput {
                        exit_code,
                        stdout,
                        stderr,
                        duration,
                    })
                } else {
                    Err(ShellError::NonZeroExit {
                        command: self.command.clone(),
                        code: exit_code,
                        stdout,
                        stderr,
                    })
                }
            }
            Outcome::TimedOut => {
                warn!(command = %self.command, timeout = ?self.timeout, "Command timed out, process group killed");
                Err(ShellError::Timeout {
                    command: self.command.clone(),
                    timeout: self.timeout,
                })
            }
            Outcome::Interrupted => Err(ShellError::Interrupted {
                command: self.command.clone(),
            }),
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>, sink: Arc<Mutex<Vec<u8>>>) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend_from_slice(&chunk[..n]),
            Err(e) => {
                warn!("Error reading command output: {}", e);
                break;
            }
        }
    }
}

/// Waits for a reader to hit EOF and returns everything it collected, even
/// if the pipe is still open after the grace period.
async fn drain(mut task: tokio::task::JoinHandle<()>, sink: &Mutex<Vec<u8>>) -> String {
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
        warn!("Output pipe still open after {:?}, keeping partial output", DRAIN_TIMEOUT);
        task.abort();
    }
    let bytes = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    String::from_utf8_lossy(&bytes).into_owned()
}

fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: killpg only sends a signal. The group id equals the pid
        // because the child was spawned with process_group(0).
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

fn write_logs(dir: &Path, label: &str, stdout: &str, stderr: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(format!("{label}.stdout.log")), stdout)?;
    std::fs::write(dir.join(format!("{label}.stderr.log")), stderr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_captures_output() {
        let output = ShellCommand::new("echo hello; echo oops >&2")
            .run()
            .await
            .unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let err = ShellCommand::new("echo failing; exit 3")
            .run()
            .await
            .unwrap_err();
        match err {
            ShellError::NonZeroExit { code, stdout, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stdout.trim(), "failing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process_tree() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("survived");
        let command = format!("(sleep 2; touch {}) & sleep 10", marker.display());

        let start = Instant::now();
        let err = ShellCommand::new(command)
            .with_timeout(Duration::from_millis(200))
            .run()
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(5));

        // The backgrounded grandchild belonged to the same group and must be gone.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_interrupt_kills_running_command() {
        let (tx, interrupt) = Interrupt::channel();
        let handle = tokio::spawn(async move {
            ShellCommand::new("sleep 10")
                .with_timeout(Duration::from_secs(30))
                .with_interrupt(interrupt)
                .run()
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ShellError::Interrupted { .. }));
        assert!(!err.is_operational());
    }

    #[tokio::test]
    async fn test_writes_log_files() {
        let temp = TempDir::new().unwrap();
        ShellCommand::new("echo out; echo err >&2")
            .with_cwd(temp.path())
            .with_log_dir(temp.path().join("logs"), "build")
            .run()
            .await
            .unwrap();

        let stdout = std::fs::read_to_string(temp.path().join("logs/build.stdout.log")).unwrap();
        let stderr = std::fs::read_to_string(temp.path().join("logs/build.stderr.log")).unwrap();
        assert_eq!(stdout.trim(), "out");
        assert_eq!(stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_background_job_does_not_hold_output() {
        let start = Instant::now();
        let output = ShellCommand::new("echo hello; (sleep 8 &)")
            .run()
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "hello");
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_never_interrupt_is_not_triggered() {
        assert!(!Interrupt::never().is_triggered());
    }
}
