//! Test utilities for the warden workspace
//!
//! This crate provides fake proxy executables, a harness that wires them to
//! a real `Supervisor`, and wait helpers for process and socket state.

pub mod helpers;

pub use helpers::proxy_harness::{ExternalProcess, ProxyHarness, ProxyScript};
pub use helpers::wait_utils::{wait_for_exit, wait_for_socket, wait_until};
