//! `trySync`/`tryPush` (§4.7): the fetch → compute → case-analysis → push
//! state machine that drives one sync attempt.

use std::path::Path;

use gitddb_git::{GitRepo, RefName};

use crate::config::{ConflictResolutionStrategy, NoMergeBaseBehavior, SyncDirection};
use crate::error::Error;
use crate::stats::{SyncAction, SyncResult};
use crate::sync::merge::{three_way_merge, Conflict};

const DEFAULT_BRANCH: &str = "main";

/// One full attempt at `trySync`: fetch, classify, merge/push as needed.
/// Returns the resulting [`SyncResult`] plus any conflicts a three-way merge
/// had to resolve.
///
/// # Errors
/// Returns [`Error::NoMergeBaseFound`] when the histories share no common
/// ancestor, and propagates any [`GitRepo`]/retry failure from fetch, merge,
/// or push.
pub fn try_sync(
    git: &dyn GitRepo,
    working_dir: &Path,
    remote: &str,
    direction: SyncDirection,
    conflict_strategy: ConflictResolutionStrategy,
    no_merge_base_behavior: NoMergeBaseBehavior,
) -> Result<(SyncResult, Vec<Conflict>), Error> {
    let remote_oid = if matches!(direction, SyncDirection::Push) {
        git.rev_parse(&format!("refs/remotes/{remote}/{DEFAULT_BRANCH}"))
            .unwrap_or_else(|_| git.rev_parse("HEAD").expect("HEAD exists once a repository is open"))
    } else {
        git.fetch(remote, DEFAULT_BRANCH)?
    };

    let local = git.rev_parse("HEAD")?;

    if local == remote_oid {
        tracing::info!(target: "gitddb::sync", remote, "no-op: local and remote already match");
        return Ok((SyncResult { action: SyncAction::NoOp, head: local }, Vec::new()));
    }

    let base = git.merge_base(local, remote_oid)?;
    match no_merge_base_behavior {
        NoMergeBaseBehavior::Abort if base.is_none() => return Err(Error::NoMergeBaseFound),
        NoMergeBaseBehavior::Abort => {}
    }

    if base == Some(local) && matches!(direction, SyncDirection::Pull | SyncDirection::Both) {
        // Fast-forward: no local commits to lose, just advance HEAD.
        let head_ref = RefName::new("HEAD").expect("HEAD is a well-known ref name");
        git.write_ref(&head_ref, remote_oid, "gitddb: fast-forward")?;
        git.checkout_tree(remote_oid, working_dir)?;
        tracing::info!(target: "gitddb::sync", remote, "fast-forwarded onto remote");
        return Ok((SyncResult { action: SyncAction::FastForward, head: remote_oid }, Vec::new()));
    }

    if base == Some(remote_oid) {
        // Nothing to merge; push local commits out (unless push is disabled).
        if matches!(direction, SyncDirection::Pull) {
            return Ok((SyncResult { action: SyncAction::NoOp, head: local }, Vec::new()));
        }
        push_local(git, remote)?;
        tracing::info!(target: "gitddb::sync", remote, "pushed with no remote changes to merge");
        return Ok((SyncResult { action: SyncAction::PushOnly, head: local }, Vec::new()));
    }

    if matches!(direction, SyncDirection::Pull) {
        return Err(Error::NoMergeBaseFound);
    }

    let local_commit = git.read_commit(local)?;
    let remote_commit = git.read_commit(remote_oid)?;
    let base_tree = base.map(|oid| git.read_commit(oid).map(|c| c.tree_oid)).transpose()?;
    let outcome = three_way_merge(
        git,
        base_tree,
        local_commit.tree_oid,
        remote_commit.tree_oid,
        conflict_strategy,
    )?;

    let message = if outcome.conflicts.is_empty() {
        "merge".to_owned()
    } else {
        let policy = match conflict_strategy {
            ConflictResolutionStrategy::Ours => "ours",
            ConflictResolutionStrategy::Theirs => "theirs",
        };
        let conflicted_ids: Vec<&str> = outcome.conflicts.iter().map(|c| c.id.as_str()).collect();
        format!("[resolve conflicts] {policy}: {}", conflicted_ids.join(", "))
    };

    let head_ref = RefName::new("HEAD").expect("HEAD is a well-known ref name");
    let merge_commit = git.create_commit(outcome.tree, &[local, remote_oid], &message, Some(&head_ref))?;
    git.checkout_tree(merge_commit, working_dir)?;
    push_local(git, remote)?;
    tracing::info!(
        target: "gitddb::sync",
        remote,
        conflicts = outcome.conflicts.len(),
        "three-way merged and pushed",
    );

    Ok((
        SyncResult { action: SyncAction::ThreeWayMerge, head: merge_commit },
        outcome.conflicts,
    ))
}

/// `tryPush`: the push half of `trySync` alone, used for push-only sessions
/// and by the live loop's retry path.
///
/// # Errors
/// Returns [`Error::CannotPushBecauseUnfetchedCommitExists`] if the remote
/// has commits this repository has not fetched.
pub fn try_push(git: &dyn GitRepo, remote: &str) -> Result<SyncResult, Error> {
    let local = git.rev_parse("HEAD")?;
    push_local(git, remote)?;
    Ok(SyncResult { action: SyncAction::PushOnly, head: local })
}

fn push_local(git: &dyn GitRepo, remote: &str) -> Result<(), Error> {
    let local_ref = format!("refs/heads/{DEFAULT_BRANCH}");
    git.push_branch(remote, &local_ref, &local_ref, false).map_err(|e| match e {
        gitddb_git::GitError::PushFailed { .. } => {
            tracing::warn!(target: "gitddb::sync", remote, "push rejected, remote has unfetched commits");
            Error::CannotPushBecauseUnfetchedCommitExists { remote: remote.to_owned() }
        }
        other => Error::Git(other),
    })
}
