//! Solver subprocess execution.
//!
//! The solver is run as `solver <input> <output>`. Its stdout and stderr are
//! streamed into the log; the last lines of stderr are kept for the error
//! message. A run that exceeds the timeout is killed.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::SolverError;

/// Number of stderr lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 20;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Outcome of a successful solver run.
#[derive(Debug, Clone)]
pub struct SolverRun {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs the external tomography solver.
#[derive(Debug, Clone)]
pub struct SolverInvoker {
    /// Path to the solver executable.
    solver_path: String,

    /// Maximum wall-clock time for one run.
    timeout: Duration,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl SolverInvoker {
    /// Create an invoker for the given executable.
    pub fn new(solver_path: impl Into<String>) -> Self {
        Self {
            solver_path: solver_path.into(),
            timeout: DEFAULT_TIMEOUT,
            env_vars: Vec::new(),
        }
    }

    /// Set the run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn solver_path(&self) -> &str {
        &self.solver_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the solver on `input`, writing `output`.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<SolverRun, SolverError> {
        info!(
            solver = %self.solver_path,
            input = %input.display(),
            output = %output.display(),
            timeout_secs = self.timeout.as_secs(),
            "Starting solver"
        );

        let mut cmd = Command::new(&self.solver_path);
        cmd.arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = output.parent() {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| {
            error!(solver = %self.solver_path, error = %source, "Failed to spawn solver");
            SolverError::Spawn {
                path: self.solver_path.clone(),
                source,
            }
        })?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stdout_task = child.stdout.take().map(|out| tokio::spawn(log_lines(out, None)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(log_lines(err, Some(tail.clone()))));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    solver = %self.solver_path,
                    timeout_secs = self.timeout.as_secs(),
                    "Solver timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    error!(error = %e, "Failed to kill solver");
                }
                return Err(SolverError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        // Drain the readers so the tail is complete.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!(error = %e, "Solver output reader task failed");
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            exit_code = ?status.code(),
            success = status.success(),
            duration_ms,
            "Solver exited"
        );

        if !status.success() {
            let stderr_tail = tail
                .lock()
                .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
                .unwrap_or_default();
            return Err(SolverError::Exit {
                code: status.code(),
                stderr_tail,
            });
        }

        Ok(SolverRun { duration_ms })
    }
}

async fn log_lines<R>(stream: R, tail: Option<Arc<Mutex<VecDeque<String>>>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match &tail {
                    Some(tail) => {
                        warn!(stderr = %trimmed, "Solver stderr");
                        if let Ok(mut tail) = tail.lock() {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(trimmed.to_string());
                        }
                    }
                    None => debug!(stdout = %trimmed, "Solver stdout"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Error reading solver output");
                break;
            }
        }
    }
}
