//! External command execution
//!
//! Every interaction with the tunnel CLI and the container runtime goes
//! through [`CommandRunner`]. A run never returns an error: non-zero exits,
//! spawn failures and timeouts are all folded into a [`CommandResult`] with
//! `success == false`, so callers have exactly one shape to inspect.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

/// Options controlling a single invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// The caller expects this command may fail; failures are logged at debug
    pub allow_failure: bool,
    /// Do not echo captured stdout into the log
    pub suppress_output: bool,
    /// Inherit the terminal instead of capturing (interactive login flows)
    pub interactive: bool,
    /// Local timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

/// A program plus its argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub options: CommandOptions,
}

impl CommandSpec {
    /// Create a spec with default options
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            options: CommandOptions::default(),
        }
    }

    pub fn allow_failure(mut self) -> Self {
        self.options.allow_failure = true;
        self
    }

    pub fn suppress_output(mut self) -> Self {
        self.options.suppress_output = true;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.options.interactive = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Render the command line for display
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one external invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Exit code, when the process ran to completion
    pub exit_code: Option<i32>,
}

impl CommandResult {
    /// A successful result carrying the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// A failed result carrying the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: None,
        }
    }

    /// Whether stdout or stderr mentions `needle`, ignoring ASCII case
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.stderr.to_ascii_lowercase().contains(&needle)
            || self.stdout.to_ascii_lowercase().contains(&needle)
    }
}

/// Abstraction over spawning external processes
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its output
    async fn run(&self, spec: &CommandSpec) -> CommandResult;
}

/// Runs commands on the local system with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    async fn spawn_and_wait(spec: &CommandSpec) -> CommandResult {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).kill_on_drop(true);

        if spec.options.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());

            return match command.status().await {
                Ok(status) => CommandResult {
                    success: status.success(),
                    stdout: String::new(),
                    stderr: if status.success() {
                        String::new()
                    } else {
                        format!("{} exited with {}", spec.program, status)
                    },
                    exit_code: status.code(),
                },
                Err(e) => CommandResult::failed(format!("failed to spawn {}: {}", spec.program, e)),
            };
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match command.output().await {
            Ok(output) => CommandResult {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
            },
            Err(e) => CommandResult::failed(format!("failed to spawn {}: {}", spec.program, e)),
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandResult {
        let line = spec.display();
        tracing::debug!(command = %line, "Running command");

        let result = match spec.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, Self::spawn_and_wait(spec)).await {
                Ok(result) => result,
                Err(_) => CommandResult::failed(format!(
                    "{} timed out after {}s",
                    line,
                    limit.as_secs()
                )),
            },
            None => Self::spawn_and_wait(spec).await,
        };

        if result.success {
            if !spec.options.suppress_output {
                for l in result.stdout.lines() {
                    tracing::debug!(command = %spec.program, "{}", l);
                }
            }
        } else if spec.options.allow_failure {
            tracing::debug!(command = %line, stderr = %result.stderr.trim(), "Command failed (allowed)");
        } else {
            tracing::warn!(command = %line, stderr = %result.stderr.trim(), "Command failed");
        }

        result
    }
}
