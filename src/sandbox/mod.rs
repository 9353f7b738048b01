//! Sandbox VM management.
//!
//! [`VmControl`] wraps the control-plane CLI and [`SandboxService`] layers the
//! guarded lifecycle transitions on top of it.

pub mod assets;
mod control;
mod lifecycle;

pub use control::{parse_status, LimaClient, VmControl, VmState, VM_NAME};
pub use lifecycle::{ensure_running, SandboxService};

#[cfg(test)]
pub(crate) use lifecycle::tests::FakeVm;
