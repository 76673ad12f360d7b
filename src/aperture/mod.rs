//! Section Aperture control-plane access.
//!
//! The deploy pipeline only needs one thing from the API: the application
//! name, which is part of the git repository URL. That lookup sits behind
//! [`ApplicationDirectory`] so the orchestrator can be handed a stub in
//! tests instead of a live HTTP client.

mod client;

pub use client::{ApertureClient, Application};

use crate::error::DeployError;

pub trait ApplicationDirectory {
    /// Name of application `app_id` owned by account `account_id`.
    fn application_name(&self, account_id: u64, app_id: u64) -> Result<String, DeployError>;
}
