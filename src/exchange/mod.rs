//! File-based job exchange between the host and the sandbox.
//!
//! Each job gets a directory under the exchange root, which the VM sees at
//! `/exchange`:
//!
//! ```text
//! <root>/<job-id>/
//!   input.bundle     written by the host on push
//!   gomodcache/      optional prefetched Go modules
//!   output.bundle    written by the sandbox when the plan is done
//! ```
//!
//! [`JobExchange::prepare`] fills the directory and clones the work into the
//! guest. [`JobExchange::pull`] waits for `output.bundle`, fast-forwards the
//! local branch to it and deletes the directory.

mod job;
mod launch;
mod layout;
mod protocol;

pub use job::JobId;
pub use launch::{build_launch_command, Launcher};
pub use layout::{ExchangeLayout, GUEST_WORKSPACE_ROOT, INPUT_BUNDLE, OUTPUT_BUNDLE};
pub use protocol::{
    JobExchange, PreparedJob, PullOptions, DEFAULT_POLL_INTERVAL, DEFAULT_PULL_TIMEOUT,
};
