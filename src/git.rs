//! Git operations used by the job exchange.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// A ref advertised by a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHead {
    pub sha: String,
    pub name: String,
}

/// Runs git in a single repository.
pub struct Git {
    runner: Arc<dyn CommandRunner>,
    repo: PathBuf,
}

impl Git {
    /// Creates a git client for the repository at `repo`.
    pub fn new(runner: Arc<dyn CommandRunner>, repo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            repo: repo.into(),
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new("git").current_dir(&self.repo)
    }

    async fn run<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.output(&self.command().args(args)).await
    }

    /// Name of the checked-out branch. Fails on a detached `HEAD`.
    pub async fn current_branch(&self) -> Result<String> {
        let output = self.run(["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if !output.success {
            return Err(Error::Git(format!(
                "failed to get current branch: {}",
                output.describe_failure()
            )));
        }

        let branch = output.stdout.trim().to_string();
        if branch.is_empty() || branch == "HEAD" {
            return Err(Error::Git(
                "HEAD is detached, check out a branch first".to_string(),
            ));
        }
        Ok(branch)
    }

    /// Writes a bundle containing `branch` to `bundle`.
    pub async fn create_bundle(&self, bundle: &Path, branch: &str) -> Result<()> {
        let output = self
            .run([
                "bundle".to_string(),
                "create".to_string(),
                bundle.to_string_lossy().into_owned(),
                branch.to_string(),
            ])
            .await?;
        if !output.success {
            return Err(Error::Git(format!(
                "git bundle create failed: {}",
                output.describe_failure()
            )));
        }
        Ok(())
    }

    /// Checks that `bundle` is well-formed and its prerequisites exist here.
    pub async fn verify_bundle(&self, bundle: &Path) -> Result<()> {
        let output = self
            .run([
                "bundle".to_string(),
                "verify".to_string(),
                bundle.to_string_lossy().into_owned(),
            ])
            .await?;
        if !output.success {
            return Err(Error::CorruptBundle {
                path: bundle.to_path_buf(),
                output: output.describe_failure(),
            });
        }
        Ok(())
    }

    /// Refs advertised by `bundle`.
    pub async fn bundle_heads(&self, bundle: &Path) -> Result<Vec<BundleHead>> {
        let output = self
            .run([
                "bundle".to_string(),
                "list-heads".to_string(),
                bundle.to_string_lossy().into_owned(),
            ])
            .await?;
        if !output.success {
            return Err(Error::Git(format!(
                "git bundle list-heads failed: {}",
                output.describe_failure()
            )));
        }
        Ok(parse_heads(&output.stdout))
    }

    /// Fetches `refname` from `bundle` into `FETCH_HEAD`.
    pub async fn fetch(&self, bundle: &Path, refname: &str) -> Result<()> {
        let output = self
            .run([
                "fetch".to_string(),
                bundle.to_string_lossy().into_owned(),
                refname.to_string(),
            ])
            .await?;
        if !output.success {
            return Err(Error::Git(format!(
                "git fetch from bundle failed: {}",
                output.describe_failure()
            )));
        }
        Ok(())
    }

    /// Fast-forwards the current branch to `rev`, refusing to create a merge
    /// commit.
    pub async fn merge_ff_only(&self, rev: &str) -> Result<()> {
        let output = self.run(["merge", "--ff-only", rev]).await?;
        if !output.success {
            return Err(Error::DivergedHistory(output.describe_failure()));
        }
        Ok(())
    }
}

/// Parses `git bundle list-heads` output (`<sha> <ref>` per line).
pub fn parse_heads(listing: &str) -> Vec<BundleHead> {
    listing
        .lines()
        .filter_map(|line| {
            let (sha, name) = line.trim().split_once(' ')?;
            let name = name.trim();
            if sha.is_empty() || name.is_empty() {
                return None;
            }
            Some(BundleHead {
                sha: sha.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Picks which bundle ref to merge into `branch`: the same branch if the
/// bundle has it, then `HEAD`, then the only ref when there is exactly one.
pub fn select_head<'a>(heads: &'a [BundleHead], branch: &str) -> Option<&'a BundleHead> {
    let wanted = format!("refs/heads/{}", branch);
    heads
        .iter()
        .find(|h| h.name == wanted)
        .or_else(|| heads.iter().find(|h| h.name == "HEAD"))
        .or_else(|| match heads {
            [only] => Some(only),
            _ => None,
        })
}
