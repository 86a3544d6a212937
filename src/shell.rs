//! External command execution.
//!
//! Every tool this program drives goes through [`Runner`], so tests can swap
//! the real process spawner for a scripted fake. The free functions on top of
//! it implement the three call policies used throughout the crate: checked
//! (failure is fatal), probe (failure reads as empty output) and best effort
//! (failure is logged and ignored).

use std::fmt;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::signals;

/// Timeout for commands that change system state.
pub const MUTATE_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for read-only queries.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Collect stdout/stderr for the caller.
    Capture,
    /// Share the terminal with the child.
    Inherit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub mode: OutputMode,
}

impl Cmd {
    pub fn new<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            env: Vec::new(),
            stdin: None,
            timeout: Some(MUTATE_TIMEOUT),
            mode: OutputMode::Capture,
        }
    }

    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Inherit the terminal and wait as long as the child runs.
    #[must_use]
    pub fn interactive(mut self) -> Self {
        self.mode = OutputMode::Inherit;
        self.timeout = None;
        self
    }

    #[must_use]
    pub fn inherit(mut self) -> Self {
        self.mode = OutputMode::Inherit;
        self
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CmdOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// stdout followed by stderr, for tools that report on either stream.
    #[must_use]
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs one external command. Errors only when the command cannot be started;
/// exit status and timeouts are reported through [`CmdOutput`].
pub trait Runner {
    fn run(&self, cmd: &Cmd) -> Result<CmdOutput>;
}

/// Spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> Result<CmdOutput> {
        debug!(command = ?cmd.to_string(), mode = ?cmd.mode, "command_start");
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        command.stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else if cmd.mode == OutputMode::Inherit {
            Stdio::inherit()
        } else {
            Stdio::null()
        });
        match cmd.mode {
            OutputMode::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputMode::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        // The child owns Ctrl-C while it shares the terminal.
        let _foreground = (cmd.mode == OutputMode::Inherit).then(signals::ForegroundChild::enter);

        let mut child = command.spawn().map_err(|source| AppError::Spawn {
            command: cmd.to_string(),
            source,
        })?;

        if let Some(data) = &cmd.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // A child that exits early closes the pipe; its status says more.
                let _ = stdin.write_all(data);
            }
        }

        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let deadline = cmd.timeout.map(|t| Instant::now() + t);
        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if cmd.mode == OutputMode::Capture && signals::interrupted() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::Interrupted);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                let _ = child.kill();
                let _ = child.wait();
                timed_out = true;
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let output = CmdOutput {
            code: status.and_then(|s| s.code()),
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
            timed_out,
        };
        debug!(
            command = ?cmd.to_string(),
            code = ?output.code,
            timed_out = output.timed_out,
            "command_finished"
        );
        Ok(output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut stream: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).to_string()
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Run and require success. A timeout or non-zero exit becomes a fatal error.
pub fn checked(runner: &dyn Runner, cmd: &Cmd) -> Result<CmdOutput> {
    let output = runner.run(cmd)?;
    if output.timed_out {
        return Err(AppError::CommandTimeout {
            command: cmd.to_string(),
            secs: cmd.timeout.map(|t| t.as_secs()).unwrap_or_default(),
        });
    }
    if output.code != Some(0) {
        let detail = if output.stderr.is_empty() {
            output.stdout.clone()
        } else {
            output.stderr.clone()
        };
        return Err(AppError::CommandFailed {
            command: cmd.to_string(),
            code: output.code,
            detail,
        });
    }
    Ok(output)
}

/// Read-only query: trimmed stdout whatever the exit status, or empty when the
/// command could not run or timed out.
pub fn probe(runner: &dyn Runner, cmd: &Cmd) -> String {
    let cmd = cmd.clone().timeout(cmd.timeout.unwrap_or(PROBE_TIMEOUT).min(PROBE_TIMEOUT));
    match runner.run(&cmd) {
        Ok(output) if !output.timed_out => output.stdout,
        Ok(_) => {
            debug!(command = ?cmd.to_string(), "probe_timed_out");
            String::new()
        }
        Err(err) => {
            debug!(command = ?cmd.to_string(), error = %err, "probe_failed");
            String::new()
        }
    }
}

/// Run and carry on regardless; returns whether the command succeeded.
pub fn best_effort(runner: &dyn Runner, cmd: &Cmd) -> bool {
    match runner.run(cmd) {
        Ok(output) if output.success() => true,
        Ok(output) => {
            warn!(
                command = ?cmd.to_string(),
                code = ?output.code,
                timed_out = output.timed_out,
                "command_failed_ignored"
            );
            false
        }
        Err(err) => {
            warn!(command = ?cmd.to_string(), error = %err, "command_failed_ignored");
            false
        }
    }
}

/// Whether `tool` resolves on PATH.
pub fn tool_exists(runner: &dyn Runner, tool: &str) -> bool {
    !probe(runner, &Cmd::new("which", &[tool])).is_empty()
}
