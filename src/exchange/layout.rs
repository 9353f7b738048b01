//! Where job files live on the host and in the guest.

use std::path::{Path, PathBuf};

use crate::deps::CACHE_DIR_NAME;
use crate::sandbox::assets::GUEST_EXCHANGE_ROOT;

use super::JobId;

/// Guest directory holding one checkout per job.
pub const GUEST_WORKSPACE_ROOT: &str = "/workspace";

/// Bundle written by the host before the job starts.
pub const INPUT_BUNDLE: &str = "input.bundle";

/// Bundle written by the sandbox when the job is done.
pub const OUTPUT_BUNDLE: &str = "output.bundle";

/// Maps job ids to exchange paths.
///
/// The host root is mounted at [`GUEST_EXCHANGE_ROOT`] inside the VM, so
/// every host path here has a guest twin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeLayout {
    host_root: PathBuf,
}

impl ExchangeLayout {
    pub fn new(host_root: impl Into<PathBuf>) -> Self {
        Self {
            host_root: host_root.into(),
        }
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    pub fn job_dir(&self, job: &JobId) -> PathBuf {
        self.host_root.join(job.as_str())
    }

    pub fn input_bundle(&self, job: &JobId) -> PathBuf {
        self.job_dir(job).join(INPUT_BUNDLE)
    }

    pub fn output_bundle(&self, job: &JobId) -> PathBuf {
        self.job_dir(job).join(OUTPUT_BUNDLE)
    }

    pub fn gomodcache(&self, job: &JobId) -> PathBuf {
        self.job_dir(job).join(CACHE_DIR_NAME)
    }

    pub fn guest_job_dir(job: &JobId) -> String {
        format!("{}/{}", GUEST_EXCHANGE_ROOT, job)
    }

    pub fn guest_input_bundle(job: &JobId) -> String {
        format!("{}/{}", Self::guest_job_dir(job), INPUT_BUNDLE)
    }

    /// Module download cache as seen from the guest, usable as a
    /// `file://` `GOPROXY` entry.
    pub fn guest_download_cache(job: &JobId) -> String {
        format!("{}/{}/cache/download", Self::guest_job_dir(job), CACHE_DIR_NAME)
    }

    pub fn guest_workspace(job: &JobId) -> String {
        format!("{}/{}", GUEST_WORKSPACE_ROOT, job)
    }
}
