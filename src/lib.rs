//! Claude Orchestrator - run implementation plans inside a Lima sandbox VM
//!
//! This library manages the lifecycle of a single sandbox VM and moves work in
//! and out of it through a shared exchange directory: the current branch goes
//! in as a git bundle, and the agent's commits come back as another bundle that
//! is fast-forward merged into the local branch.

pub mod config;
pub mod deps;
pub mod error;
pub mod exchange;
pub mod git;
pub mod paths;
pub mod runner;
pub mod sandbox;

pub use config::{Config, Validate, ValidationResult};
pub use deps::{find_matching_deps, DepCoordinate, DependencyCache};
pub use error::{Error, Result};
pub use exchange::{
    build_launch_command, ExchangeLayout, JobExchange, JobId, Launcher, PreparedJob, PullOptions,
};
pub use git::{BundleHead, Git};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use sandbox::{LimaClient, SandboxService, VmControl, VmState};
