//! # Migfra Remote
//!
//! Remote command execution on benchmarked VMs.
//!
//! This crate provides:
//! - [`RemoteShell`] - the contract task runners execute workloads through
//! - [`SshShell`] - an implementation driving the system `ssh` client

pub mod shell;
pub mod ssh;

// Re-export main types
pub use shell::{CommandOutput, RemoteShell};
pub use ssh::{SshOptions, SshShell};
