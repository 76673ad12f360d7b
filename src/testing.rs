//! Fixtures for tests that need a real git remote.
//!
//! Remotes are bare repositories laid out the way the platform serves them,
//! `<root>/account/<a>/application/<b>/<name>.git`, so a `file://` base URL
//! can stand in for the hosted one.

use git2::{Index, IndexEntry, IndexTime, Oid, Repository, Signature};
use std::path::{Path, PathBuf};

use crate::aperture::ApplicationDirectory;
use crate::error::DeployError;

/// Directory that answers every lookup with the same application name.
pub struct KnownApplication(pub String);

impl ApplicationDirectory for KnownApplication {
    fn application_name(&self, _account_id: u64, _app_id: u64) -> Result<String, DeployError> {
        Ok(self.0.clone())
    }
}

pub fn file_url(root: &Path) -> String {
    format!("file://{}", root.display())
}

pub fn bare_remote(root: &Path, account_id: u64, app_id: u64, repo_name: &str) -> Repository {
    let path: PathBuf = root
        .join("account")
        .join(account_id.to_string())
        .join("application")
        .join(app_id.to_string())
        .join(format!("{repo_name}.git"));
    std::fs::create_dir_all(&path).unwrap();
    Repository::init_bare(&path).unwrap()
}

/// Commit `files` on top of `branch` (creating it if needed) without a
/// working tree. Blobs are written first so the standalone index only holds
/// ids.
pub fn commit_files(repo: &Repository, branch: &str, files: &[(&str, &[u8])], message: &str) -> Oid {
    let refname = format!("refs/heads/{branch}");
    let parent = repo
        .find_reference(&refname)
        .ok()
        .map(|r| r.peel_to_commit().unwrap());

    let mut index = Index::new().unwrap();
    if let Some(p) = &parent {
        index.read_tree(&p.tree().unwrap()).unwrap();
    }
    for (path, data) in files {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: data.len() as u32,
            id: repo.blob(data).unwrap(),
            flags: 0,
            flags_extended: 0,
            path: path.as_bytes().to_vec(),
        };
        index.add(&entry).unwrap();
    }
    let tree_id = index.write_tree_to(repo).unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::now("seed", "seed@example.com").unwrap();
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some(&refname), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Content of `path` at the tip of `branch`.
pub fn read_file(repo: &Repository, branch: &str, path: &str) -> Vec<u8> {
    let commit = repo
        .find_reference(&format!("refs/heads/{branch}"))
        .unwrap()
        .peel_to_commit()
        .unwrap();
    let entry = commit.tree().unwrap().get_path(Path::new(path)).unwrap();
    repo.find_blob(entry.id()).unwrap().content().to_vec()
}
