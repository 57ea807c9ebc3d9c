//! External command execution.
//!
//! Stages that drive external binaries (the SQL engine, fetch programs)
//! never spawn processes themselves; they hand a [`CommandSpec`] to the
//! [`CommandExecutor`] carried by the stage context, so binary locations
//! stay configuration.

mod queue;

pub use queue::{wait_for_job, JobId, JobQueue, JobStatus, LocalJobQueue};

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common_error::{ShardlineError, ShardlineResult};
use shardline_catalog::FileRef;

// ============================================================================
// Commands
// ============================================================================

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program path or name.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command without arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg:?}")?;
        }
        Ok(())
    }
}

/// Argument placeholder replaced by the output directory.
pub const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";

/// Argument placeholder expanded into one argument per input file.
pub const INPUTS_PLACEHOLDER: &str = "{inputs}";

/// Command with placeholders for the output directory and input files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    /// Program path or name.
    pub program: String,
    /// Argument templates.
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// `program {output_dir} {inputs}`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                OUTPUT_DIR_PLACEHOLDER.to_string(),
                INPUTS_PLACEHOLDER.to_string(),
            ],
        }
    }

    /// Replace the argument templates.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Reject templates that cannot produce a command.
    pub fn validate(&self) -> ShardlineResult<()> {
        if self.program.trim().is_empty() {
            return Err(ShardlineError::config("command template has no program"));
        }
        Ok(())
    }

    /// Build the concrete command for one invocation.
    pub fn expand(&self, output_dir: &Path, inputs: &[FileRef]) -> CommandSpec {
        let output_dir = output_dir.to_string_lossy();
        let mut command = CommandSpec::new(self.program.clone());
        for arg in &self.args {
            if arg == INPUTS_PLACEHOLDER {
                command = command.args(inputs.iter().map(FileRef::to_string));
            } else {
                command = command.arg(arg.replace(OUTPUT_DIR_PLACEHOLDER, &output_dir));
            }
        }
        command
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured stdout; empty when stdout was redirected to a file.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty stdout lines, trimmed.
    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Runs external commands on behalf of stages.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion.
    ///
    /// With `stdout_to` set, stdout is written to that file instead of
    /// being captured. A non-zero exit is an `ExternalCommand` error.
    async fn execute(
        &self,
        command: &CommandSpec,
        stdout_to: Option<&Path>,
    ) -> ShardlineResult<CommandOutput>;
}

/// Executor spawning local processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        command: &CommandSpec,
        stdout_to: Option<&Path>,
    ) -> ShardlineResult<CommandOutput> {
        let mut process = tokio::process::Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match stdout_to {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let file = tokio::fs::File::create(path).await.map_err(|e| {
                    ShardlineError::storage(format!("Failed to create {}: {e}", path.display()))
                })?;
                process.stdout(Stdio::from(file.into_std().await));
            }
            None => {
                process.stdout(Stdio::piped());
            }
        }

        log::debug!("exec: {command}");
        // `Command::output` forces piped stdout, so spawn and wait instead.
        let child = process.spawn().map_err(|e| {
            ShardlineError::external_command(format!("failed to spawn {}: {e}", command.program))
        })?;
        let output = child.wait_with_output().await.map_err(|e| {
            ShardlineError::external_command(format!("failed to wait for {}: {e}", command.program))
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ShardlineError::external_command(format!(
                "{} exited with {}: {}",
                command.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
