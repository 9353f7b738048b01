//! Push and pull of jobs through the shared exchange directory.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::config::{Validate, ValidationResult};
use crate::deps::{self, DepCoordinate, DependencyCache};
use crate::error::{Error, Result};
use crate::git::{self, Git};
use crate::runner::CommandRunner;
use crate::sandbox::{ensure_running, VmControl};

use super::{ExchangeLayout, JobId, Launcher};

/// Default time to wait for the sandbox to produce its bundle.
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default delay between checks for the output bundle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How long and how often [`JobExchange::pull`] waits for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PULL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PullOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Validate for PullOptions {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        // A zero timeout checks for the bundle once. Sleeps are clamped to
        // the deadline, so a long interval only means fewer checks.
        if self.poll_interval.is_zero() {
            result.add_error("poll interval must be greater than zero");
        } else if self.poll_interval >= self.timeout && !self.timeout.is_zero() {
            result.add_warning(format!(
                "poll interval {:?} is not shorter than the pull timeout {:?}, the bundle is checked only at the start and at the deadline",
                self.poll_interval, self.timeout
            ));
        }

        result
    }
}

/// A job handed to the sandbox by [`JobExchange::prepare`].
#[derive(Debug, Clone)]
pub struct PreparedJob {
    pub job_id: JobId,
    /// Branch that was bundled and that results are merged back into.
    pub branch: String,
    /// Host shell command that starts the agent for this job.
    pub command: String,
    /// Host side of the job's exchange directory.
    pub exchange_dir: PathBuf,
    /// Modules prefetched into the exchange directory, if any.
    pub dependencies: Vec<DepCoordinate>,
    plan_path: String,
}

/// Moves work into the sandbox and results back out.
pub struct JobExchange {
    vm: Arc<dyn VmControl>,
    runner: Arc<dyn CommandRunner>,
    layout: ExchangeLayout,
    launcher: Launcher,
    deps: DependencyCache,
}

impl JobExchange {
    /// Creates an exchange using `runner` for host-side git and go, and `vm`
    /// for guest-side commands.
    pub fn new(
        vm: Arc<dyn VmControl>,
        runner: Arc<dyn CommandRunner>,
        layout: ExchangeLayout,
    ) -> Self {
        let launcher = Launcher::new(vm.limactl(), vm.name());
        Self {
            deps: DependencyCache::new(runner.clone()),
            vm,
            runner,
            layout,
            launcher,
        }
    }

    /// Overrides how launch commands are rendered.
    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Overrides the dependency downloader.
    pub fn with_dependency_cache(mut self, deps: DependencyCache) -> Self {
        self.deps = deps;
        self
    }

    pub fn layout(&self) -> &ExchangeLayout {
        &self.layout
    }

    /// Bundles the current branch of `repo_root`, clones it into a fresh guest
    /// workspace and returns the command that runs `plan_path` there.
    ///
    /// Nothing long-running is started.
    pub async fn prepare(&self, repo_root: &Path, plan_path: &str) -> Result<PreparedJob> {
        ensure_running(self.vm.as_ref()).await?;

        let git = Git::new(self.runner.clone(), repo_root);
        let branch = git.current_branch().await?;

        let job_id = JobId::generate();
        let exchange_dir = self.layout.job_dir(&job_id);
        tokio::fs::create_dir_all(&exchange_dir).await?;

        tracing::info!(job_id = %job_id, branch = %branch, "creating input bundle");
        git.create_bundle(&self.layout.input_bundle(&job_id), &branch).await?;

        tracing::info!(job_id = %job_id, "cloning into sandbox workspace");
        let clone = [
            "git".to_string(),
            "clone".to_string(),
            "-b".to_string(),
            branch.clone(),
            ExchangeLayout::guest_input_bundle(&job_id),
            ExchangeLayout::guest_workspace(&job_id),
        ];
        self.vm.exec(&clone).await?;

        let command = self.launcher.command(&job_id, plan_path, &[]);
        Ok(PreparedJob {
            job_id,
            branch,
            command,
            exchange_dir,
            dependencies: Vec::new(),
            plan_path: plan_path.to_string(),
        })
    }

    /// Downloads private modules required anywhere under `repo_root` into the
    /// job's exchange directory and points the launch command at them.
    ///
    /// Leaves `job` untouched on failure.
    pub async fn prefetch_dependencies(
        &self,
        job: &mut PreparedJob,
        repo_root: &Path,
        patterns: &[String],
    ) -> Result<()> {
        let found = deps::find_matching_deps(repo_root, patterns);
        if found.is_empty() {
            tracing::debug!(job_id = %job.job_id, "no matching Go dependencies");
            return Ok(());
        }

        self.deps.download(&found, &job.exchange_dir).await?;
        tracing::info!(job_id = %job.job_id, count = found.len(), "prefetched Go dependencies");

        job.command = self.launcher.command(&job.job_id, &job.plan_path, patterns);
        job.dependencies = found;
        Ok(())
    }

    /// Waits for the sandbox's output bundle, fast-forwards the current branch
    /// of `repo_root` to it and removes the job's exchange directory.
    pub async fn pull(&self, repo_root: &Path, job_id: &str, options: &PullOptions) -> Result<()> {
        self.pull_until(repo_root, job_id, options, std::future::pending::<()>())
            .await
    }

    /// Like [`pull`](Self::pull), but gives up with [`Error::Cancelled`] if
    /// `cancel` completes before the bundle appears.
    ///
    /// On any failure the exchange directory is left in place.
    pub async fn pull_until<F>(
        &self,
        repo_root: &Path,
        job_id: &str,
        options: &PullOptions,
        cancel: F,
    ) -> Result<()>
    where
        F: Future,
    {
        let job_id = JobId::parse(job_id)?;
        options.validate().check()?;

        let bundle = self.layout.output_bundle(&job_id);
        tracing::info!(job_id = %job_id, path = ?bundle, "waiting for output bundle");

        let wait = wait_for_bundle(&bundle, options);
        tokio::pin!(wait);
        tokio::pin!(cancel);
        tokio::select! {
            biased;
            res = &mut wait => res?,
            _ = &mut cancel => return Err(Error::Cancelled(bundle.clone())),
        }

        let git = Git::new(self.runner.clone(), repo_root);
        git.verify_bundle(&bundle).await?;

        let branch = git.current_branch().await?;
        let heads = git.bundle_heads(&bundle).await?;
        let head = git::select_head(&heads, &branch).ok_or_else(|| {
            Error::Git(format!(
                "output bundle has no ref to merge into {} (found {})",
                branch,
                heads
                    .iter()
                    .map(|h| h.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        tracing::info!(job_id = %job_id, head = %head.name, branch = %branch, "merging results");
        git.fetch(&bundle, &head.name).await?;
        git.merge_ff_only("FETCH_HEAD").await?;

        let dir = self.layout.job_dir(&job_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            let err = Error::Cleanup {
                path: dir,
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "results merged but cleanup failed");
        }

        tracing::info!(job_id = %job_id, "pull complete");
        Ok(())
    }
}

async fn wait_for_bundle(path: &Path, options: &PullOptions) -> Result<()> {
    let started = Instant::now();
    let deadline = started + options.timeout;

    loop {
        if tokio::fs::try_exists(path).await? {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout {
                path: path.to_path_buf(),
                waited: now - started,
            });
        }
        sleep(options.poll_interval.min(deadline - now)).await;
    }
}
