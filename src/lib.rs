//! Crate entry point for **sectionctl**.
//!
//! This library holds the deployment trigger behind the `sectionctl` CLI:
//! given a payload that has already been uploaded, it updates the
//! application's descriptor in its git repository and pushes the change,
//! which is what the hosting platform deploys from.
//!
//! Each submodule encapsulates one responsibility (config, git operations,
//! descriptor editing, progress output, etc.). [`deploy::Orchestrator`] ties
//! them together.

mod aperture;
mod config;
mod deadline;
pub mod deploy;
mod descriptor;
mod error;
mod git;
mod paths;
mod progress;
mod workspace;

#[cfg(test)]
mod testing;

/// Re-export the types and commands callers need from `sectionctl::*`.
pub use aperture::{ApertureClient, Application, ApplicationDirectory};
pub use config::{Settings, load_settings};
pub use deadline::CancelToken;
pub use deploy::{DeployArgs, DeployTrigger, Orchestrator, cmd_deploy};
pub use descriptor::{DESCRIPTOR_FILE_NAME, PAYLOAD_ID_FIELD};
pub use error::{DeployError, Diagnostics, RetryPolicy};
pub use git::Credential;
pub use paths::paths;
pub use progress::OutputMode;
