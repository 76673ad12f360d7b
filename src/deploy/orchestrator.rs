use git2::{Oid, Repository};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, instrument};

use super::request::{DeployTrigger, repository_url};
use crate::aperture::ApplicationDirectory;
use crate::config::Settings;
use crate::deadline::{CancelToken, Deadline, with_retries};
use crate::descriptor::{self, Descriptor};
use crate::error::DeployError;
use crate::git::{self, Credential, Identity};
use crate::progress::OutputMode;
use crate::workspace::{WORKSPACE_PREFIX, Workspace};

/// Author of descriptor update commits. The change is generated by the
/// tool, not written by whoever ran it.
pub const COMMIT_IDENTITY: Identity = Identity {
    name: "sectionctl",
    email: "noreply@section.io",
};

pub fn commit_message(descriptor_path: &Path) -> String {
    format!(
        "[sectionctl] updated {} with new deployment.",
        descriptor_path.display()
    )
}

/// Turns an uploaded payload into a live deployment.
///
/// Clones the application repository, points its descriptor at the new
/// payload, commits and pushes. The hosting platform deploys on push.
/// Each [`trigger`](Orchestrator::trigger) call owns a private workspace
/// that is gone again when the call returns, whatever the outcome.
pub struct Orchestrator<D> {
    directory: D,
    git_url: String,
    credential: Credential,
    timeout: Option<Duration>,
    retries: u32,
    output: OutputMode,
    cancel: CancelToken,
    workspace_root: Option<PathBuf>,
}

impl<D: ApplicationDirectory> Orchestrator<D> {
    pub fn new(directory: D, settings: &Settings, credential: Credential, output: OutputMode) -> Self {
        Self {
            directory,
            git_url: settings.git_url.clone(),
            credential,
            timeout: settings.timeout(),
            retries: settings.transport_retries,
            output,
            cancel: CancelToken::new(),
            workspace_root: None,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create workspaces under `root` instead of the system temp dir.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[instrument(skip_all, fields(account_id = req.account_id, app_id = req.app_id, environment = %req.environment))]
    pub fn trigger(&self, req: &DeployTrigger) -> Result<(), DeployError> {
        let deadline = Deadline::new(self.timeout, self.cancel.clone());
        let path = descriptor::descriptor_path(&req.app_path)?;

        deadline.check("lookup")?;
        self.output.set_message("looking up application…");
        let name = self
            .directory
            .application_name(req.account_id, req.app_id)?;
        let url = repository_url(&self.git_url, req.account_id, req.app_id, &name);
        debug!(%url, "resolved repository");

        let workspace = match &self.workspace_root {
            Some(root) => Workspace::create_in(root, WORKSPACE_PREFIX)?,
            None => Workspace::create(WORKSPACE_PREFIX)?,
        };
        let commit = self.run(&workspace, req, &url, &path, &deadline)?;
        workspace.close();

        info!(%commit, payload_id = %req.payload_id, "deployment triggered");
        Ok(())
    }

    fn run(
        &self,
        workspace: &Workspace,
        req: &DeployTrigger,
        url: &str,
        path: &Path,
        deadline: &Deadline,
    ) -> Result<Oid, DeployError> {
        let dest = workspace.clone_dir();

        self.output
            .set_message(format!("cloning {} branch…", req.environment));
        let repo = with_retries("clone", self.retries, deadline, |_| {
            git::probe_branch(url, &req.environment, &self.credential, deadline)?;
            if dest.exists() {
                fs::remove_dir_all(&dest).map_err(DeployError::Workspace)?;
            }
            git::clone_branch(
                url,
                &req.environment,
                &dest,
                &self.credential,
                &self.output,
                deadline,
            )
        })?;

        deadline.check("update descriptor")?;
        self.output.set_message("updating descriptor…");
        let head = repo
            .head()
            .and_then(|h| h.peel_to_tree())
            .map_err(DeployError::git("read HEAD"))?;
        let current = descriptor::locate(&repo, &head, path)?;
        debug!(
            old = %String::from_utf8_lossy(&current.content),
            payload_id = %req.payload_id,
            "updating descriptor"
        );
        let bytes = current.mutate(&req.payload_id)?;
        descriptor::write_to_worktree(&dest, path, &bytes)?;

        deadline.check("commit")?;
        git::stage(&repo, path)?;
        let oid = git::commit(&repo, &commit_message(path), COMMIT_IDENTITY, SystemTime::now())?;
        verify_committed(&repo, oid, path, &bytes)?;

        self.output
            .set_message(format!("pushing to {}…", req.environment));
        with_retries("push", self.retries, deadline, |_| {
            git::push(&repo, &req.environment, &self.credential, &self.output, deadline)
        })?;
        Ok(oid)
    }
}

/// Read the descriptor back out of the new commit and make sure it is what
/// we wrote to the working tree.
fn verify_committed(
    repo: &Repository,
    oid: Oid,
    path: &Path,
    expected: &[u8],
) -> Result<(), DeployError> {
    let tree = repo
        .find_commit(oid)
        .and_then(|c| c.tree())
        .map_err(DeployError::git("verify"))?;
    let Descriptor { content, .. } = descriptor::locate(repo, &tree, path)?;
    debug!(content = %String::from_utf8_lossy(&content), "descriptor in new commit");
    if content != expected {
        return Err(DeployError::GitOperation {
            op: "verify",
            cause: git2::Error::from_str("committed descriptor differs from the written file"),
        });
    }
    Ok(())
}
