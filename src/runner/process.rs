//! Runner backed by real OS processes.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

use super::{CommandOutput, CommandRunner, CommandSpec};

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        Self
    }

    fn build(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(spec.program());
        cmd.args(spec.get_args());
        if let Some(dir) = spec.dir() {
            cmd.current_dir(dir);
        }
        for (key, value) in spec.envs() {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn_error(spec: &CommandSpec, source: std::io::Error) -> Error {
        Error::Spawn {
            program: spec.program().to_string(),
            source,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!(command = %spec, dir = ?spec.dir(), "running command");

        let output = Self::build(spec)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Self::spawn_error(spec, e))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn interactive(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!(command = %spec, "running interactive command");

        let status = Self::build(spec)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| Self::spawn_error(spec, e))?;

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            ..Default::default()
        })
    }
}
