use git2::{
    Direction, ErrorClass, ErrorCode, FetchOptions, Oid, PushOptions, Remote, RemoteCallbacks,
    Repository, Signature, Status, Time, build::RepoBuilder,
};
use std::cell::RefCell;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

use super::credentials::{AuthState, Credential};
use crate::deadline::Deadline;
use crate::error::{DeployError, Diagnostics};
use crate::progress::{OutputMode, ProgressStream};

const CONNECT_TIMEOUT_CAP: Duration = Duration::from_secs(30);

/// Author and committer of machine-generated commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub name: &'static str,
    pub email: &'static str,
}

pub fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// Apply process-wide libgit2 socket timeouts.
///
/// Must run once at startup, before any transport is in use.
pub fn configure_transport_timeouts(timeout: Duration) -> Result<(), git2::Error> {
    let to_ms = |d: Duration| i32::try_from(d.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: called once per process, before any libgit2 transport starts.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(to_ms(
            timeout.min(CONNECT_TIMEOUT_CAP),
        ))?;
        git2::opts::set_server_timeout_in_milliseconds(to_ms(timeout))?;
    }
    Ok(())
}

/// Build callbacks that authenticate with `credential`, feed `stream`, and
/// abort the transfer once `deadline` says so.
fn callbacks<'a>(
    credential: &'a Credential,
    deadline: &'a Deadline,
    stream: &'a ProgressStream,
    auth: &'a AuthState,
) -> RemoteCallbacks<'a> {
    let mut cb = RemoteCallbacks::new();
    cb.credentials(move |_url, _username_from_url, allowed| auth.provide(credential, allowed));
    cb.transfer_progress(move |p| {
        stream.objects(p.received_objects(), p.total_objects());
        deadline.proceed()
    });
    cb.sideband_progress(move |data| {
        stream.write(data);
        deadline.proceed()
    });
    cb.push_transfer_progress(move |current, total, _bytes| stream.objects(current, total));
    cb
}

/// Map a failed clone/probe to the error taxonomy. Deadline and
/// cancellation take precedence since an aborting callback surfaces as a
/// plain user error.
fn transport_error(
    url: &str,
    step: &'static str,
    err: git2::Error,
    auth: &AuthState,
    deadline: &Deadline,
    diagnostics: Diagnostics,
) -> DeployError {
    if let Err(e) = deadline.check(step) {
        return e;
    }
    if auth.rejected() || err.code() == ErrorCode::Auth {
        return DeployError::Auth {
            target: url.to_string(),
        };
    }
    DeployError::Transport {
        url: url.to_string(),
        cause: err,
        diagnostics,
    }
}

/// Ask the remote for its refs and make sure `branch` is among them.
#[instrument(skip_all, fields(%url, %branch))]
pub fn probe_branch(
    url: &str,
    branch: &str,
    credential: &Credential,
    deadline: &Deadline,
) -> Result<(), DeployError> {
    let refname = branch_ref(branch);
    let auth = AuthState::default();
    let stream = ProgressStream::Discard;
    let fail = |e| transport_error(url, "probe", e, &auth, deadline, Diagnostics::default());

    let mut remote = Remote::create_detached(url).map_err(DeployError::git("remote setup"))?;
    let found = {
        let conn = remote
            .connect_auth(
                Direction::Fetch,
                Some(callbacks(credential, deadline, &stream, &auth)),
                None,
            )
            .map_err(fail)?;
        let heads = conn.list().map_err(fail)?;
        debug!(advertised = heads.len(), "listed remote refs");
        heads.iter().any(|h| h.name() == refname)
    };
    if !found {
        return Err(DeployError::RefNotFound { refname });
    }
    Ok(())
}

/// Clone `url` into `dest` with `branch` checked out.
///
/// Full history is fetched so the commit we add has a real parent chain.
#[instrument(skip_all, fields(%url, %branch, dest = %dest.display()))]
pub fn clone_branch(
    url: &str,
    branch: &str,
    dest: &Path,
    credential: &Credential,
    mode: &OutputMode,
    deadline: &Deadline,
) -> Result<Repository, DeployError> {
    let stream = mode.stream();
    let auth = AuthState::default();
    let result = {
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(callbacks(credential, deadline, &stream, &auth));
        RepoBuilder::new()
            .branch(branch)
            .fetch_options(fo)
            .clone(url, dest)
    };
    let diagnostics = stream.finish();

    let repo = match result {
        Ok(repo) => repo,
        Err(e) if e.class() == ErrorClass::Reference && e.code() == ErrorCode::NotFound => {
            return Err(DeployError::RefNotFound {
                refname: branch_ref(branch),
            });
        }
        Err(e) => return Err(transport_error(url, "clone", e, &auth, deadline, diagnostics)),
    };

    if let Ok(head) = repo.head().and_then(|h| h.peel_to_commit()) {
        debug!(head = %head.id(), summary = head.summary().unwrap_or_default(), "HEAD commit");
    }
    Ok(repo)
}

/// Add `path` (relative to the working tree) to the index.
pub fn stage(repo: &Repository, path: &Path) -> Result<(), DeployError> {
    let mut index = repo.index().map_err(DeployError::git("stage"))?;
    index.add_path(path).map_err(DeployError::git("stage"))?;
    index.write().map_err(DeployError::git("stage"))?;

    if let Ok(statuses) = repo.statuses(None) {
        for s in statuses.iter().filter(|s| s.status() != Status::CURRENT) {
            debug!(path = s.path().unwrap_or_default(), status = ?s.status(), "git status");
        }
    }
    Ok(())
}

/// Commit the index on top of HEAD.
pub fn commit(
    repo: &Repository,
    message: &str,
    identity: Identity,
    when: SystemTime,
) -> Result<Oid, DeployError> {
    let git = DeployError::git;
    let secs = when
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let sig = Signature::new(identity.name, identity.email, &Time::new(secs, 0))
        .map_err(git("signature"))?;

    let mut index = repo.index().map_err(git("commit"))?;
    let tree_id = index.write_tree().map_err(git("commit"))?;
    let tree = repo.find_tree(tree_id).map_err(git("commit"))?;
    let parent = repo
        .head()
        .and_then(|h| h.peel_to_commit())
        .map_err(git("commit"))?;

    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
        .map_err(git("commit"))?;
    debug!(commit = %oid, parent = %parent.id(), "created commit");
    Ok(oid)
}

/// Push `branch` to `origin`.
///
/// In quiet mode the remote's progress text is drained into a capture
/// buffer while the push runs; it is joined before the outcome is looked
/// at and attached to any resulting error.
#[instrument(skip_all, fields(%branch))]
pub fn push(
    repo: &Repository,
    branch: &str,
    credential: &Credential,
    mode: &OutputMode,
    deadline: &Deadline,
) -> Result<(), DeployError> {
    push_through(repo, branch, credential, mode.stream(), deadline)
}

fn push_through(
    repo: &Repository,
    branch: &str,
    credential: &Credential,
    stream: ProgressStream,
    deadline: &Deadline,
) -> Result<(), DeployError> {
    let refname = branch_ref(branch);
    let refspec = format!("{0}:{0}", refname);
    let auth = AuthState::default();
    let rejected: RefCell<Vec<String>> = RefCell::new(Vec::new());

    let result = (|| -> Result<(), git2::Error> {
        let mut remote = repo.find_remote("origin")?;
        let mut cb = callbacks(credential, deadline, &stream, &auth);
        cb.push_update_reference(|name, status| {
            if let Some(msg) = status {
                rejected.borrow_mut().push(format!("{}: {}", name, msg));
            }
            Ok(())
        });
        let mut po = PushOptions::new();
        po.remote_callbacks(cb);
        remote.push(&[refspec.as_str()], Some(&mut po))
    })();
    let diagnostics = stream.finish();

    let rejected = rejected.into_inner();
    let cause = match result {
        Ok(()) if rejected.is_empty() => return Ok(()),
        Ok(()) => git2::Error::from_str(&format!("remote rejected {}", rejected.join(", "))),
        Err(e) => e,
    };

    deadline.check("push")?;
    let cause = if auth.rejected() {
        git2::Error::new(ErrorCode::Auth, ErrorClass::Http, "credentials rejected by remote")
    } else {
        cause
    };
    Err(DeployError::Push { cause, diagnostics })
}
