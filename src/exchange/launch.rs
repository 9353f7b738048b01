//! Builds the command that starts a job inside the sandbox.

use crate::sandbox::VM_NAME;

use super::{ExchangeLayout, JobId};

/// Fallback module proxies tried after the job's local cache.
const UPSTREAM_PROXIES: &str = "https://proxy.golang.org,direct";

/// Renders launch commands for a particular VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    limactl: String,
    vm_name: String,
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new("limactl", VM_NAME)
    }
}

impl Launcher {
    pub fn new(limactl: impl Into<String>, vm_name: impl Into<String>) -> Self {
        Self {
            limactl: limactl.into(),
            vm_name: vm_name.into(),
        }
    }

    /// Host shell command that runs the agent on `plan_path` in the job's
    /// guest workspace.
    ///
    /// With `patterns`, the agent resolves private modules from the job's
    /// prefetched cache and skips checksum lookups for them.
    pub fn command(&self, job: &JobId, plan_path: &str, patterns: &[String]) -> String {
        let mut inner = format!("cd {} && ", ExchangeLayout::guest_workspace(job));
        if !patterns.is_empty() {
            inner.push_str(&format!(
                "GOPROXY=file://{},{} GONOSUMCHECK={} ",
                ExchangeLayout::guest_download_cache(job),
                UPSTREAM_PROXIES,
                patterns.join(",")
            ));
        }

        let prompt = format!("/executing-plans {} {}", plan_path, job);
        inner.push_str(&format!(
            "claude --dangerously-skip-permissions {}",
            double_quote(&prompt)
        ));

        format!(
            "{} shell {} -- bash -c {}",
            self.limactl,
            self.vm_name,
            single_quote(&inner)
        )
    }
}

/// [`Launcher::command`] for the default VM.
pub fn build_launch_command(job: &JobId, plan_path: &str, patterns: &[String]) -> String {
    Launcher::default().command(job, plan_path, patterns)
}

fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn single_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
