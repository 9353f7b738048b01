//! User configuration and validation.
//!
//! The config file is TOML. Every field has a default, so a missing file or
//! a partial one is fine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exchange::PullOptions;
use crate::sandbox::VM_NAME;

/// Problems found in a config section. Errors block the command, warnings
/// are only logged.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Logs the warnings, then fails with every error joined into one
    /// [`Error::Config`].
    pub fn check(self) -> Result<()> {
        for warning in &self.warnings {
            tracing::warn!("{}", warning);
        }
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

/// Top-level `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub go_proxy: GoProxyConfig,
    pub sandbox: SandboxConfig,
    pub pull: PullConfig,
}

/// Private Go modules to prefetch for sandbox jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoProxyConfig {
    /// Module path patterns such as `github.com/myorg/*`.
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Lima instance name.
    pub vm_name: String,
    /// Path or name of the `limactl` binary.
    pub limactl: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            vm_name: VM_NAME.to_string(),
            limactl: "limactl".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for PullConfig {
    fn default() -> Self {
        let defaults = PullOptions::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            poll_interval_secs: defaults.poll_interval.as_secs(),
        }
    }
}

impl PullConfig {
    pub fn options(&self) -> PullOptions {
        PullOptions::default()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
    }
}

impl Config {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Writes the default config to `path` unless a file is already there.
    /// Returns whether a file was written.
    pub fn init(path: &Path) -> Result<bool> {
        if path.exists() {
            tracing::info!(path = ?path, "config file already exists");
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(&Self::default())
            .map_err(|e| Error::Config(format!("failed to serialize defaults: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!(path = ?path, "created config file");
        Ok(true)
    }
}

impl Validate for GoProxyConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        for pattern in &self.patterns {
            if pattern.trim().is_empty() {
                result.add_error("go_proxy.patterns cannot contain an empty pattern");
                continue;
            }
            match pattern.find('*') {
                Some(pos) if pos + 1 != pattern.len() => {
                    result.add_error(format!(
                        "go_proxy pattern {:?}: '*' is only allowed at the end",
                        pattern
                    ));
                }
                Some(_) => {}
                None => {
                    result.add_warning(format!(
                        "go_proxy pattern {:?} has no trailing '*' and is matched as a literal prefix",
                        pattern
                    ));
                }
            }
        }

        result
    }
}

impl Validate for SandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.vm_name.trim().is_empty() {
            result.add_error("sandbox.vm_name cannot be empty");
        }
        if self.limactl.trim().is_empty() {
            result.add_error("sandbox.limactl cannot be empty");
        }

        result
    }
}

impl Validate for PullConfig {
    fn validate(&self) -> ValidationResult {
        self.options().validate()
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        result.merge(self.go_proxy.validate());
        result.merge(self.sandbox.validate());
        result.merge(self.pull.validate());
        result
    }
}
