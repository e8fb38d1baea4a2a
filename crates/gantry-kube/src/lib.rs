//! Thin Kubernetes layer for Gantry
//!
//! Provides client bootstrap, pod lifecycle waits, exec with an
//! optional stdin stream, and tar streaming into a running container.
//! Everything here is cluster plumbing; build semantics live in
//! `gantry-build`.

pub mod client;
pub mod copy;
pub mod error;
pub mod exec;
pub mod wait;

pub use client::client;
pub use copy::copy_tar_into_container;
pub use error::{KubeError, Result};
pub use exec::{exec, exec_with_stdin};
pub use wait::{
    container_terminal_state, wait_for_container_terminated, wait_for_pod_initialized,
};
