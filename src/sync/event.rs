//! Sync event subscription (§4.7/§6): `{change, localChange, remoteChange,
//! paused, active, start, complete, error}`, each firing exactly once per
//! sync completion, in that order, plus `paused`/`active` on pause/resume
//! transitions.

use crate::stats::SyncResult;

/// Which event a handler wants to receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncEventKind {
    /// Both local and remote changed (merge happened).
    Change,
    /// Only the local replica advanced (push-only, or local side of a merge).
    LocalChange,
    /// Only the remote replica advanced (fast-forward, or remote side of a merge).
    RemoteChange,
    /// The session was paused.
    Paused,
    /// The session resumed after a pause.
    Active,
    /// A sync attempt began.
    Start,
    /// A sync attempt finished successfully.
    Complete,
    /// A sync attempt failed (after exhausting retries).
    Error,
}

/// Identifying information about the task that produced an event, passed
/// alongside every event payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskMetadata {
    /// The task id assigned at enqueue time.
    pub task_id: String,
    /// The remote this sync session targets.
    pub remote: String,
}

/// An error as delivered to an `error` event handler.
///
/// Holds a rendered message rather than the originating [`crate::Error`]
/// itself: the error is also returned to the caller of `trySync`/`tryPush`,
/// and `Error` isn't `Clone`, so handlers get the formatted description
/// instead of a second owned copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncErrorInfo {
    /// `Display` output of the error that failed the sync attempt.
    pub message: String,
}

/// A single fired sync event, carrying whatever payload its kind implies.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// `start`: a sync attempt began.
    Start(TaskMetadata),
    /// `change`/`localChange`/`remoteChange`: a side (or both) advanced.
    Change(SyncEventKind, SyncResult, TaskMetadata),
    /// `complete`: a sync attempt finished successfully.
    Complete(TaskMetadata),
    /// `error`: a sync attempt failed.
    Error(SyncErrorInfo, TaskMetadata),
    /// `paused`/`active`: the live scheduler changed state.
    StateChange(SyncEventKind, TaskMetadata),
}

impl SyncEvent {
    /// The event kind this instance represents, matching the kind a handler
    /// registered for via [`crate::sync::SyncSession::on`].
    #[must_use]
    pub fn kind(&self) -> SyncEventKind {
        match self {
            Self::Start(_) => SyncEventKind::Start,
            Self::Change(kind, ..) => *kind,
            Self::Complete(_) => SyncEventKind::Complete,
            Self::Error(..) => SyncEventKind::Error,
            Self::StateChange(kind, _) => *kind,
        }
    }
}
