//! The external source descriptor.
//!
//! Each application keeps `<app path>/.section-external-source.json` in its
//! repository. The hosting platform reads the `id` field to learn which
//! uploaded payload is live. We only ever change that field; every other
//! top-level member keeps its position and the exact text of its value.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use git2::{ErrorCode, ObjectType, Repository, Tree};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;

use crate::error::DeployError;

pub const DESCRIPTOR_FILE_NAME: &str = ".section-external-source.json";

/// Field holding the identifier of the deployed payload.
pub const PAYLOAD_ID_FIELD: &str = "id";

/// Descriptor as found in a commit tree.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Repository-relative path, `/`-separated.
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Repository-relative descriptor path for an application directory.
///
/// Leading `/`, `.` segments and repeated separators are dropped; an empty
/// app path points at the repository root. `..` can never name a tree entry
/// and is reported as a missing descriptor.
pub fn descriptor_path(app_path: &str) -> Result<PathBuf, DeployError> {
    let mut path = PathBuf::new();
    for component in Path::new(app_path).components() {
        match component {
            Component::Normal(segment) => path.push(segment),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(DeployError::DescriptorNotFound {
                    path: Path::new(app_path).join(DESCRIPTOR_FILE_NAME),
                });
            }
        }
    }
    path.push(DESCRIPTOR_FILE_NAME);
    Ok(path)
}

/// Find the descriptor blob in `tree`.
pub fn locate(repo: &Repository, tree: &Tree<'_>, path: &Path) -> Result<Descriptor, DeployError> {
    let entry = match tree.get_path(path) {
        Ok(e) => e,
        Err(e) if e.code() == ErrorCode::NotFound => {
            return Err(DeployError::DescriptorNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(DeployError::git("tree lookup")(e)),
    };
    if entry.kind() != Some(ObjectType::Blob) {
        return Err(DeployError::DescriptorNotFound {
            path: path.to_path_buf(),
        });
    }
    let blob = repo
        .find_blob(entry.id())
        .map_err(DeployError::git("blob read"))?;
    Ok(Descriptor {
        path: path.to_path_buf(),
        content: blob.content().to_vec(),
    })
}

impl Descriptor {
    /// Rewrite the descriptor with `payload_id` as its `id`.
    pub fn mutate(&self, payload_id: &str) -> Result<Vec<u8>, DeployError> {
        mutate(&self.path, &self.content, payload_id)
    }
}

/// Top-level members of a JSON object in document order, values unparsed.
struct Members(Vec<(String, Box<RawValue>)>);

impl<'de> Deserialize<'de> for Members {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = Members;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Members, A::Error> {
                let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(member) = map.next_entry::<String, Box<RawValue>>()? {
                    members.push(member);
                }
                Ok(Members(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}

/// Set the payload id in a descriptor document and lay its top-level
/// members out one per tab-indented line.
///
/// Values other than `id` are copied byte for byte, escapes and nested
/// formatting included. The output is a pure function of the members and
/// `payload_id`, so running it on its own output is a no-op.
pub fn mutate(path: &Path, content: &[u8], payload_id: &str) -> Result<Vec<u8>, DeployError> {
    let parse_err = |reason: String| DeployError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let Members(members) =
        serde_json::from_slice(content).map_err(|e| parse_err(e.to_string()))?;
    if !members.iter().any(|(key, _)| key == PAYLOAD_ID_FIELD) {
        return Err(parse_err(format!("missing \"{}\" field", PAYLOAD_ID_FIELD)));
    }
    let id = serde_json::to_string(payload_id).map_err(|e| parse_err(e.to_string()))?;

    let mut out = String::with_capacity(content.len() + payload_id.len());
    out.push('{');
    for (i, (key, value)) in members.iter().enumerate() {
        out.push_str(if i == 0 { "\n\t" } else { ",\n\t" });
        out.push_str(&serde_json::to_string(key).map_err(|e| parse_err(e.to_string()))?);
        out.push_str(": ");
        out.push_str(if key == PAYLOAD_ID_FIELD { id.as_str() } else { value.get() });
    }
    out.push_str("\n}");
    Ok(out.into_bytes())
}

/// Write the mutated descriptor into the checked-out working copy.
pub fn write_to_worktree(workdir: &Path, path: &Path, bytes: &[u8]) -> Result<(), DeployError> {
    let full = workdir.join(path);
    fs::write(&full, bytes).map_err(|source| DeployError::Write { path: full, source })
}
