//! gix-backed tree-to-tree diff.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::*;

fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(oid: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = oid.as_bytes().try_into().expect("SHA1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

fn from_gix_mode(mode: gix::objs::tree::EntryMode) -> Option<EntryMode> {
    use gix::objs::tree::EntryKind;
    Some(match mode.kind() {
        EntryKind::Blob => EntryMode::Blob,
        EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        EntryKind::Tree => EntryMode::Tree,
        EntryKind::Link => EntryMode::Link,
        EntryKind::Commit => EntryMode::Commit,
    })
}

pub fn diff_trees(
    repo: &GixRepo,
    old: Option<GitOid>,
    new: GitOid,
) -> Result<Vec<DiffEntry>, GitError> {
    let old_tree = match old {
        Some(oid) => repo
            .repo
            .find_tree(to_gix_oid(oid))
            .map_err(|e| GitError::NotFound {
                message: format!("tree {oid}: {e}"),
            })?,
        None => repo.repo.empty_tree(),
    };
    let new_tree = repo
        .repo
        .find_tree(to_gix_oid(new))
        .map_err(|e| GitError::NotFound {
            message: format!("tree {new}: {e}"),
        })?;

    let mut entries = Vec::new();
    let mut platform = old_tree.changes().map_err(|e| GitError::BackendError {
        message: format!("failed to initialize diff: {e}"),
    })?;
    platform.options(|opts| {
        opts.track_rewrites(None);
    });
    platform
        .for_each_to_obtain_tree(&new_tree, |change| {
            let entry = match change {
                gix::object::tree::diff::Change::Addition {
                    location,
                    entry_mode,
                    id,
                    ..
                } => DiffEntry {
                    path: location.to_string(),
                    change_type: ChangeType::Added,
                    old_oid: GitOid::ZERO,
                    new_oid: from_gix_oid(id.detach()),
                    old_mode: None,
                    new_mode: from_gix_mode(entry_mode),
                },
                gix::object::tree::diff::Change::Deletion {
                    location,
                    entry_mode,
                    id,
                    ..
                } => DiffEntry {
                    path: location.to_string(),
                    change_type: ChangeType::Deleted,
                    old_oid: from_gix_oid(id.detach()),
                    new_oid: GitOid::ZERO,
                    old_mode: from_gix_mode(entry_mode),
                    new_mode: None,
                },
                gix::object::tree::diff::Change::Modification {
                    location,
                    previous_entry_mode,
                    previous_id,
                    entry_mode,
                    id,
                } => DiffEntry {
                    path: location.to_string(),
                    change_type: ChangeType::Modified,
                    old_oid: from_gix_oid(previous_id.detach()),
                    new_oid: from_gix_oid(id.detach()),
                    old_mode: from_gix_mode(previous_entry_mode),
                    new_mode: from_gix_mode(entry_mode),
                },
                gix::object::tree::diff::Change::Rewrite {
                    source_location,
                    source_entry_mode,
                    source_id,
                    entry_mode,
                    location,
                    id,
                    ..
                } => DiffEntry {
                    path: location.to_string(),
                    change_type: ChangeType::Renamed {
                        from: source_location.to_string(),
                    },
                    old_oid: from_gix_oid(source_id.detach()),
                    new_oid: from_gix_oid(id.detach()),
                    old_mode: from_gix_mode(source_entry_mode),
                    new_mode: from_gix_mode(entry_mode),
                },
            };
            entries.push(entry);
            Ok::<_, std::convert::Infallible>(gix::object::tree::diff::Action::Continue)
        })
        .map_err(|e| GitError::BackendError {
            message: format!("tree diff failed: {e}"),
        })?;

    Ok(entries)
}
