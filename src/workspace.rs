use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::DeployError;

/// Prefix of every workspace directory created under the system temp dir.
pub const WORKSPACE_PREFIX: &str = "sectionctl-";

/// Disposable directory owned by exactly one deployment run.
///
/// The directory is removed when the value is dropped, so every exit path
/// (early `?` return, panic unwinding, cancellation) releases it. Call
/// [`Workspace::close`] on the success path to observe removal errors.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace under the system temp dir.
    pub fn create(prefix: &str) -> Result<Self, DeployError> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(DeployError::Workspace)?;
        debug!(path = %dir.path().display(), "created workspace");
        Ok(Self { dir })
    }

    pub fn create_in(parent: &Path, prefix: &str) -> Result<Self, DeployError> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(DeployError::Workspace)?;
        debug!(path = %dir.path().display(), "created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory the repository is cloned into.
    pub fn clone_dir(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "removed workspace"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove workspace"),
        }
    }
}
