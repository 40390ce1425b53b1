//! Three-way merge (§4.7): per-path case analysis between a common ancestor
//! (`base`) and two divergent trees (`ours`, `theirs`).
//!
//! Blobs are merged whole — a path's content is taken from one side or the
//! other, never line-merged — since a document is a single JSON value with
//! no sub-path structure the engine understands.

use std::collections::BTreeMap;

use gitddb_git::{ChangeType, DiffEntry, GitOid, GitRepo, TreeEdit};

use crate::config::ConflictResolutionStrategy;
use crate::error::Error;

/// Which kind of write a conflict's resolution ended up applying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictOperation {
    /// The winning side's content was written (case 4: both modified).
    Put,
    /// The winning side's deletion was applied (case 11: removed vs. changed).
    Delete,
}

/// A path that changed on both sides of a merge and needed a policy decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    /// The path that conflicted (collection-prefixed, as stored in the tree).
    pub id: String,
    /// The policy applied to resolve it.
    pub strategy: ConflictResolutionStrategy,
    /// What the resolution did.
    pub operation: ConflictOperation,
}

/// Outcome of [`three_way_merge`].
pub struct MergeOutcome {
    /// The merged tree.
    pub tree: GitOid,
    /// Paths resolved by taking `ours`'s side with no conflict.
    pub ours_only: Vec<String>,
    /// Paths resolved by taking `theirs`'s side with no conflict.
    pub theirs_only: Vec<String>,
    /// Paths that changed on both sides and needed `strategy` to resolve.
    pub conflicts: Vec<Conflict>,
}

/// Merge `ours` and `theirs` against their common ancestor `base` (`None` for
/// an unborn repository, though `trySync` never calls this without a base).
///
/// # Errors
/// Propagates any [`GitRepo`] failure reading or writing tree objects.
pub fn three_way_merge(
    git: &dyn GitRepo,
    base: Option<GitOid>,
    ours: GitOid,
    theirs: GitOid,
    strategy: ConflictResolutionStrategy,
) -> Result<MergeOutcome, Error> {
    let ours_diff = diff_by_path(git, base, ours)?;
    let theirs_diff = diff_by_path(git, base, theirs)?;

    let mut paths: Vec<&String> = ours_diff.keys().chain(theirs_diff.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut edits = Vec::new();
    let mut ours_only = Vec::new();
    let mut theirs_only = Vec::new();
    let mut conflicts = Vec::new();

    for path in paths {
        let ours_entry = ours_diff.get(path);
        let theirs_entry = theirs_diff.get(path);

        match (ours_entry, theirs_entry) {
            // case 1 / other: only theirs touched this path, accept theirs.
            (None, Some(theirs_entry)) => {
                apply_side(&mut edits, path, theirs_entry);
                theirs_only.push(path.clone());
            }
            // case 2 / other: only ours touched this path; the working tree
            // (built from `ours`) already has the right content.
            (Some(_), None) => {
                ours_only.push(path.clone());
            }
            (Some(o), Some(t)) => {
                if o.new_oid == t.new_oid && o.change_type == t.change_type {
                    // Both sides made the identical change; no conflict.
                    ours_only.push(path.clone());
                } else if o.change_type == ChangeType::Deleted || t.change_type == ChangeType::Deleted {
                    // case 11: removed on one side, changed on the other.
                    let winner = match strategy {
                        ConflictResolutionStrategy::Ours => o,
                        ConflictResolutionStrategy::Theirs => t,
                    };
                    apply_side(&mut edits, path, winner);
                    conflicts.push(Conflict {
                        id: path.clone(),
                        strategy,
                        operation: if winner.change_type == ChangeType::Deleted {
                            ConflictOperation::Delete
                        } else {
                            ConflictOperation::Put
                        },
                    });
                } else {
                    // case 4: changed on both sides with unequal contents.
                    let winner = match strategy {
                        ConflictResolutionStrategy::Ours => o,
                        ConflictResolutionStrategy::Theirs => t,
                    };
                    apply_side(&mut edits, path, winner);
                    conflicts.push(Conflict {
                        id: path.clone(),
                        strategy,
                        operation: ConflictOperation::Put,
                    });
                }
            }
            (None, None) => unreachable!("path came from one of the two diffs"),
        }
    }

    let tree = if edits.is_empty() { ours } else { git.edit_tree(ours, &edits)? };

    Ok(MergeOutcome { tree, ours_only, theirs_only, conflicts })
}

fn diff_by_path(git: &dyn GitRepo, base: Option<GitOid>, side: GitOid) -> Result<BTreeMap<String, DiffEntry>, Error> {
    Ok(git
        .diff_trees(base, side)?
        .into_iter()
        .map(|e| (e.path.clone(), e))
        .collect())
}

fn apply_side(edits: &mut Vec<TreeEdit>, path: &str, entry: &DiffEntry) {
    match entry.change_type {
        ChangeType::Deleted => edits.push(TreeEdit::Remove { path: path.to_owned() }),
        _ => edits.push(TreeEdit::Upsert {
            path: path.to_owned(),
            mode: entry.new_mode.unwrap_or(gitddb_git::EntryMode::Blob),
            oid: entry.new_oid,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitddb_git::{EntryMode, GixRepo};
    use tempfile::tempdir;

    fn repo() -> (tempfile::TempDir, GixRepo) {
        let dir = tempdir().unwrap();
        let init = GixRepo::init(dir.path()).unwrap();
        init.write_config("user.name", "t").unwrap();
        init.write_config("user.email", "t@t").unwrap();
        let repo = GixRepo::open_at(dir.path()).unwrap();
        (dir, repo)
    }

    fn blob(git: &dyn GitRepo, content: &str) -> GitOid {
        git.write_blob(content.as_bytes()).unwrap()
    }

    fn tree(git: &dyn GitRepo, entries: &[(&str, GitOid)]) -> GitOid {
        let edits: Vec<TreeEdit> = entries
            .iter()
            .map(|(path, oid)| TreeEdit::Upsert {
                path: (*path).to_owned(),
                mode: EntryMode::Blob,
                oid: *oid,
            })
            .collect();
        let empty = git.write_tree(&[]).unwrap();
        git.edit_tree(empty, &edits).unwrap()
    }

    #[test]
    fn disjoint_adds_both_accepted_without_conflict() {
        let (_dir, git) = repo();
        let a = blob(&git, "a");
        let b = blob(&git, "b");
        let base = git.write_tree(&[]).unwrap();
        let ours = tree(&git, &[("x.json", a)]);
        let theirs = tree(&git, &[("y.json", b)]);

        let outcome =
            three_way_merge(&git, Some(base), ours, theirs, ConflictResolutionStrategy::Ours).unwrap();
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.theirs_only, vec!["y.json".to_owned()]);
        let entries = git.read_tree(outcome.tree).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn conflicting_edits_resolve_by_strategy() {
        let (_dir, git) = repo();
        let base_blob = blob(&git, "base");
        let ours_blob = blob(&git, "ours");
        let theirs_blob = blob(&git, "theirs");
        let base = tree(&git, &[("x.json", base_blob)]);
        let ours = tree(&git, &[("x.json", ours_blob)]);
        let theirs = tree(&git, &[("x.json", theirs_blob)]);

        let outcome =
            three_way_merge(&git, Some(base), ours, theirs, ConflictResolutionStrategy::Theirs).unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].operation, ConflictOperation::Put);
        let entries = git.read_tree(outcome.tree).unwrap();
        assert_eq!(entries[0].oid, theirs_blob);
    }

    #[test]
    fn delete_vs_modify_is_a_conflict() {
        let (_dir, git) = repo();
        let base_blob = blob(&git, "base");
        let theirs_blob = blob(&git, "theirs");
        let base = tree(&git, &[("x.json", base_blob)]);
        let ours = git.write_tree(&[]).unwrap(); // ours deleted x.json
        let theirs = tree(&git, &[("x.json", theirs_blob)]);

        let outcome =
            three_way_merge(&git, Some(base), ours, theirs, ConflictResolutionStrategy::Theirs).unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        let entries = git.read_tree(outcome.tree).unwrap();
        assert_eq!(entries[0].oid, theirs_blob);
    }
}
