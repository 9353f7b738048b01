//! Sandbox VM lifecycle state machine.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::assets::{self, LIMA_TEMPLATE, PROVISIONED_ASSETS};
use super::control::{VmControl, VmState};

/// Fails with [`Error::NotCreated`] or [`Error::NotRunning`] unless `vm` is
/// running.
pub async fn ensure_running(vm: &dyn VmControl) -> Result<()> {
    match vm.state().await? {
        VmState::Running => Ok(()),
        VmState::Stopped => Err(Error::NotRunning),
        VmState::NotCreated => Err(Error::NotCreated),
    }
}

/// Guarded transitions over the single sandbox VM.
///
/// State is re-queried from the control plane on every call; nothing is
/// cached between operations.
pub struct SandboxService {
    vm: Arc<dyn VmControl>,
    /// Host directory mounted at `/exchange` in the guest.
    exchange_root: PathBuf,
}

impl SandboxService {
    /// Creates a service that mounts `exchange_root` into newly created VMs.
    pub fn new(vm: Arc<dyn VmControl>, exchange_root: PathBuf) -> Self {
        Self { vm, exchange_root }
    }

    /// Returns the current VM state.
    pub async fn status(&self) -> Result<VmState> {
        self.vm.state().await
    }

    /// Fails unless the VM is running.
    pub async fn require_running(&self) -> Result<()> {
        ensure_running(self.vm.as_ref()).await
    }

    /// Creates, starts and provisions the VM, reusing it if it already exists.
    pub async fn create(&self) -> Result<()> {
        match self.vm.state().await? {
            VmState::Running => {
                tracing::info!("sandbox is already created and running");
            }
            VmState::Stopped => {
                tracing::info!("sandbox exists but is stopped, starting");
                self.vm.start().await?;
            }
            VmState::NotCreated => {
                tokio::fs::create_dir_all(&self.exchange_root).await?;
                let rendered = assets::render_template(LIMA_TEMPLATE, &self.exchange_root)?;
                let template = assets::materialize("lima.yaml", &rendered)?;

                tracing::info!(exchange = ?self.exchange_root, "creating sandbox");
                self.vm.create(template.path()).await?;
            }
        }
        self.provision().await
    }

    /// Boots a stopped VM.
    pub async fn start(&self) -> Result<()> {
        match self.vm.state().await? {
            VmState::NotCreated => Err(Error::NotCreated),
            VmState::Running => {
                tracing::info!("sandbox is already running");
                Ok(())
            }
            VmState::Stopped => self.vm.start().await,
        }
    }

    /// Halts a running VM.
    pub async fn stop(&self) -> Result<()> {
        match self.vm.state().await? {
            VmState::NotCreated => {
                tracing::info!("sandbox is not created");
                Ok(())
            }
            VmState::Stopped => {
                tracing::info!("sandbox is already stopped");
                Ok(())
            }
            VmState::Running => self.vm.stop().await,
        }
    }

    /// Deletes the VM. The control plane asks for confirmation on the terminal.
    pub async fn destroy(&self) -> Result<()> {
        match self.vm.state().await? {
            VmState::NotCreated => {
                tracing::info!("sandbox is not created");
                Ok(())
            }
            VmState::Stopped | VmState::Running => self.vm.delete().await,
        }
    }

    /// Copies the agent config and skill files into the running VM.
    ///
    /// The first failed step aborts the rest. Temp files are released on
    /// every path.
    pub async fn provision(&self) -> Result<()> {
        self.require_running().await?;

        let files = PROVISIONED_ASSETS
            .iter()
            .map(|asset| assets::materialize(asset.name, asset.contents).map(|f| (asset, f)))
            .collect::<Result<Vec<_>>>()?;

        let dirs = assets::guest_parent_dirs(PROVISIONED_ASSETS);
        if !dirs.is_empty() {
            let script = format!("mkdir -p {}", dirs.join(" "));
            self.vm
                .exec(&["bash".to_string(), "-c".to_string(), script])
                .await?;
        }

        for (asset, file) in &files {
            tracing::debug!(asset = asset.name, guest = asset.guest_path, "copying into sandbox");
            self.vm.copy_in(file.path(), asset.guest_path).await?;
        }

        tracing::info!("provisioned config into sandbox");
        Ok(())
    }

    /// Opens an interactive shell, or runs `args` with the terminal attached.
    pub async fn shell(&self, args: &[String]) -> Result<()> {
        self.require_running().await?;
        self.vm.shell(args).await
    }
}
