//! gix-backed ref, rev-parse, ancestry, and history operations.

use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit as GixRefEdit, RefLog};
use gix::refs::Target;
use gix::revision::walk::Sorting;

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

pub fn read_ref(repo: &GixRepo, name: &RefName) -> Result<Option<GitOid>, GitError> {
    let Some(mut reference) =
        repo.repo
            .try_find_reference(name.as_str())
            .map_err(|e| GitError::BackendError {
                message: format!("failed to look up ref '{name}': {e}"),
            })?
    else {
        return Ok(None);
    };
    let id = reference.peel_to_id_in_place().map_err(|e| GitError::BackendError {
        message: format!("failed to peel ref '{name}': {e}"),
    })?;
    Ok(Some(from_gix_oid(id.detach())))
}

pub fn write_ref(
    repo: &GixRepo,
    name: &RefName,
    oid: GitOid,
    log_message: &str,
) -> Result<(), GitError> {
    // `HEAD` is usually symbolic (pointing at `refs/heads/<branch>`); writing
    // through the literal name would detach it instead of advancing the
    // branch, so resolve to the referent first when one exists.
    let target = if name.as_str() == "HEAD" {
        repo.repo
            .head_name()
            .map_err(|e| GitError::BackendError {
                message: format!("failed to resolve HEAD: {e}"),
            })?
            .map_or_else(|| name.as_str().to_owned(), |full_name| full_name.as_bstr().to_string())
    } else {
        name.as_str().to_owned()
    };

    repo.repo
        .reference(target, to_gix_oid(oid), PreviousValue::Any, log_message.to_owned())
        .map_err(|e| GitError::BackendError {
            message: format!("failed to write ref '{name}': {e}"),
        })?;
    Ok(())
}

pub fn atomic_ref_update(repo: &GixRepo, edits: &[RefEdit]) -> Result<(), GitError> {
    let gix_edits: Vec<GixRefEdit> = edits
        .iter()
        .map(|edit| {
            let expected = if edit.expected_old_oid.is_zero() {
                PreviousValue::MustNotExist
            } else {
                PreviousValue::MustExistAndMatch(Target::Object(to_gix_oid(edit.expected_old_oid)))
            };
            Ok(GixRefEdit {
                change: Change::Update {
                    log: LogChange {
                        mode: RefLog::AndReference,
                        force_create_reflog: false,
                        message: "gitddb: atomic ref update".into(),
                    },
                    expected,
                    new: Target::Object(to_gix_oid(edit.new_oid)),
                },
                name: edit.name.as_str().try_into().map_err(|e| GitError::InvalidOid {
                    value: edit.name.as_str().to_owned(),
                    reason: format!("{e}"),
                })?,
                deref: false,
            })
        })
        .collect::<Result<_, GitError>>()?;

    repo.repo.edit_references(gix_edits).map_err(|e| GitError::RefConflict {
        ref_name: edits
            .first()
            .map(|e| e.name.as_str().to_owned())
            .unwrap_or_default(),
        message: e.to_string(),
    })?;
    Ok(())
}

pub fn rev_parse(repo: &GixRepo, spec: &str) -> Result<GitOid, GitError> {
    let id = repo
        .repo
        .rev_parse_single(spec)
        .map_err(|e| GitError::NotFound {
            message: format!("revision '{spec}': {e}"),
        })?;
    Ok(from_gix_oid(id.detach()))
}

pub fn rev_parse_opt(repo: &GixRepo, spec: &str) -> Result<Option<GitOid>, GitError> {
    match repo.repo.rev_parse_single(spec) {
        Ok(id) => Ok(Some(from_gix_oid(id.detach()))),
        Err(_) => Ok(None),
    }
}

pub fn is_ancestor(repo: &GixRepo, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError> {
    if ancestor == descendant {
        return Ok(true);
    }
    match repo.repo.merge_base(to_gix_oid(ancestor), to_gix_oid(descendant)) {
        Ok(base) => Ok(from_gix_oid(base.detach()) == ancestor),
        Err(gix::repository::merge_base::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(GitError::BackendError {
            message: format!("ancestry check failed: {e}"),
        }),
    }
}

pub fn merge_base(repo: &GixRepo, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError> {
    match repo.repo.merge_base(to_gix_oid(a), to_gix_oid(b)) {
        Ok(base) => Ok(Some(from_gix_oid(base.detach()))),
        Err(gix::repository::merge_base::Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(GitError::BackendError {
            message: format!("merge-base lookup failed: {e}"),
        }),
    }
}

pub fn list_commits(
    repo: &GixRepo,
    from: Option<GitOid>,
    to: GitOid,
) -> Result<Vec<GitOid>, GitError> {
    let mut platform = repo
        .repo
        .rev_walk(std::iter::once(to_gix_oid(to)))
        .sorting(Sorting::ByCommitTime(gix::traverse::commit::simple::CommitTimeOrder::NewestFirst));
    if let Some(from) = from {
        platform = platform.with_boundary(std::iter::once(to_gix_oid(from)));
    }
    let walk = platform.all().map_err(|e| GitError::BackendError {
        message: format!("failed to start revision walk: {e}"),
    })?;

    let mut commits = Vec::new();
    for info in walk {
        let info = info.map_err(|e| GitError::BackendError {
            message: format!("revision walk failed: {e}"),
        })?;
        commits.push(from_gix_oid(info.id));
    }
    Ok(commits)
}
