//! Control-plane client for the sandbox VM.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Name of the Lima instance managed by this tool.
pub const VM_NAME: &str = "cco-sandbox";

/// Lifecycle state of the sandbox VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    /// No instance with the tracked name exists.
    NotCreated,
    /// The instance exists but is not running.
    Stopped,
    /// The instance is running.
    Running,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmState::NotCreated => write!(f, "NotCreated"),
            VmState::Stopped => write!(f, "Stopped"),
            VmState::Running => write!(f, "Running"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LimaInstance {
    name: String,
    #[serde(default)]
    status: String,
}

/// Parses `limactl list --json` output into the state of instance `name`.
///
/// Accepts both newline-delimited objects and a single JSON array. An empty
/// listing, or one without `name`, means [`VmState::NotCreated`]. Any status
/// other than `Running` (including `Broken`) is treated as stopped.
pub fn parse_status(listing: &str, name: &str) -> Result<VmState> {
    let trimmed = listing.trim();
    if trimmed.is_empty() {
        return Ok(VmState::NotCreated);
    }

    let instances: Vec<LimaInstance> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| Error::StatusParse(e.to_string()))?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| Error::StatusParse(e.to_string()))
            })
            .collect::<Result<_>>()?
    };

    let state = match instances.iter().find(|i| i.name == name) {
        None => VmState::NotCreated,
        Some(instance) if instance.status == "Running" => VmState::Running,
        Some(instance) => {
            tracing::debug!(status = %instance.status, "treating instance status as stopped");
            VmState::Stopped
        }
    };
    Ok(state)
}

/// Control-plane operations on the single sandbox VM.
#[async_trait]
pub trait VmControl: Send + Sync {
    /// Queries the current state.
    async fn state(&self) -> Result<VmState>;

    /// Creates and boots the VM from a template file.
    async fn create(&self, template: &Path) -> Result<()>;

    /// Boots a stopped VM.
    async fn start(&self) -> Result<()>;

    /// Halts a running VM.
    async fn stop(&self) -> Result<()>;

    /// Deletes the VM. The control tool may prompt for confirmation.
    async fn delete(&self) -> Result<()>;

    /// Copies a host file to `guest_path` inside the VM.
    async fn copy_in(&self, local: &Path, guest_path: &str) -> Result<()>;

    /// Runs a command inside the VM and returns its combined output.
    async fn exec(&self, args: &[String]) -> Result<String>;

    /// Runs a command (or a login shell when `args` is empty) inside the VM
    /// with the terminal attached.
    async fn shell(&self, args: &[String]) -> Result<()>;

    /// Instance name, used when building commands for other processes.
    fn name(&self) -> &str;

    /// Control binary, used with [`name`](Self::name) in launch commands.
    fn limactl(&self) -> &str;
}

/// [`VmControl`] implementation driving `limactl`.
pub struct LimaClient {
    runner: Arc<dyn CommandRunner>,
    limactl: String,
    name: String,
}

impl LimaClient {
    /// Creates a client for the default instance using `limactl` from `PATH`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            limactl: "limactl".to_string(),
            name: VM_NAME.to_string(),
        }
    }

    /// Overrides the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the `limactl` binary.
    pub fn with_limactl(mut self, limactl: impl Into<String>) -> Self {
        self.limactl = limactl.into();
        self
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.limactl)
    }

    fn check(spec: &CommandSpec, output: CommandOutput) -> Result<CommandOutput> {
        if output.success {
            return Ok(output);
        }
        let subcommand = spec.get_args().first().map(String::as_str).unwrap_or("");
        Err(Error::ControlPlane {
            command: format!("{} {}", spec.program(), subcommand),
            output: output.describe_failure(),
        })
    }

    async fn capture(&self, spec: CommandSpec) -> Result<CommandOutput> {
        let output = self.runner.output(&spec).await?;
        Self::check(&spec, output)
    }

    async fn attach(&self, spec: CommandSpec) -> Result<()> {
        let output = self.runner.interactive(&spec).await?;
        Self::check(&spec, output).map(|_| ())
    }
}

#[async_trait]
impl VmControl for LimaClient {
    async fn state(&self) -> Result<VmState> {
        let output = self.capture(self.command().args(["list", "--json"])).await?;
        parse_status(&output.stdout, &self.name)
    }

    async fn create(&self, template: &Path) -> Result<()> {
        let spec = self
            .command()
            .arg("start")
            .arg(format!("--name={}", self.name))
            .arg(template.to_string_lossy());
        self.attach(spec).await
    }

    async fn start(&self) -> Result<()> {
        self.attach(self.command().args(["start", self.name.as_str()])).await
    }

    async fn stop(&self) -> Result<()> {
        self.attach(self.command().args(["stop", self.name.as_str()])).await
    }

    async fn delete(&self) -> Result<()> {
        self.attach(self.command().args(["delete", self.name.as_str()])).await
    }

    async fn copy_in(&self, local: &Path, guest_path: &str) -> Result<()> {
        let spec = self
            .command()
            .arg("cp")
            .arg(local.to_string_lossy())
            .arg(format!("{}:{}", self.name, guest_path));
        self.capture(spec).await.map(|_| ())
    }

    async fn exec(&self, args: &[String]) -> Result<String> {
        let spec = self
            .command()
            .args(["shell", self.name.as_str(), "--"])
            .args(args.iter().cloned());
        Ok(self.capture(spec).await?.combined())
    }

    async fn shell(&self, args: &[String]) -> Result<()> {
        let spec = self
            .command()
            .args(["shell", self.name.as_str()])
            .args(args.iter().cloned());
        self.attach(spec).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn limactl(&self) -> &str {
        &self.limactl
    }
}
