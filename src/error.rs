//! Error types for the sandbox orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for sandbox and job exchange operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The sandbox VM does not exist yet.
    #[error("sandbox not created, run `cco box create`")]
    NotCreated,

    /// The sandbox VM exists but is not running.
    #[error("sandbox not running, run `cco box start`")]
    NotRunning,

    /// The VM control tool exited non-zero.
    #[error("{command} failed: {output}")]
    ControlPlane { command: String, output: String },

    /// An external program could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The VM status listing could not be parsed.
    #[error("failed to parse limactl output: {0}")]
    StatusParse(String),

    /// No output bundle appeared before the pull deadline.
    #[error("timed out after {waited:?} waiting for output bundle at {}", path.display())]
    Timeout { path: PathBuf, waited: Duration },

    /// The pull was cancelled before an output bundle appeared.
    #[error("cancelled while waiting for output bundle at {}", .0.display())]
    Cancelled(PathBuf),

    /// The output bundle failed `git bundle verify`.
    #[error("bundle verification failed for {}: {output}", path.display())]
    CorruptBundle { path: PathBuf, output: String },

    /// Fast-forward merge was rejected.
    #[error("fast-forward merge failed (branches may have diverged): {0}")]
    DivergedHistory(String),

    /// Git operation failed.
    #[error("git operation failed: {0}")]
    Git(String),

    /// Prefetching dependencies into the exchange directory failed.
    #[error("dependency download failed: {0}")]
    DependencyFetch(String),

    /// Failed to remove a job's exchange directory.
    #[error("failed to clean up exchange directory {}: {reason}", path.display())]
    Cleanup { path: PathBuf, reason: String },

    /// The embedded VM template could not be rendered.
    #[error("template error: {0}")]
    Template(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error during exchange or asset operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;
