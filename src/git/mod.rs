//! Git integration layer.
//!
//! This module wraps the `git2` backend and re-exports the operations the
//! deploy pipeline needs: probe, clone, stage, commit and push.
//!
//! Callers never touch `git2` callbacks directly; credentials, progress
//! routing and deadline checks are wired up inside the backend.

mod credentials;
mod git2_backend;

pub use credentials::{Credential, TRANSPORT_USERNAME};
pub use git2_backend::{
    Identity, clone_branch, commit, configure_transport_timeouts, probe_branch, push, stage,
};
