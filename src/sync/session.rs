//! `SyncSession` (§4.7/§6): one configured remote, driven either by explicit
//! `try_sync`/`try_push` calls or by a host-paced `live_tick`.
//!
//! Matches the queue's own single-threaded, push-triggered design (§4.3):
//! there is no internal thread or timer here, just state a host can poll.

use std::cell::{Cell, RefCell};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::SyncOptions;
use crate::error::Error;
use crate::repo::Repository;
use crate::retry::with_retry;
use crate::stats::{SyncAction, SyncResult, TaskResult};
use crate::sync::engine;
use crate::sync::event::{SyncErrorInfo, SyncEvent, SyncEventKind, TaskMetadata};
use crate::task::{Task, TaskLabel};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as i64
}

/// Opaque handle returned by [`SyncSession::on`], passed back to [`SyncSession::off`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerId(usize);

struct Handler {
    kind: SyncEventKind,
    callback: Box<dyn Fn(&SyncEvent)>,
}

/// One configured remote.
///
/// Holds the options, the event subscriber list, and live-mode pause state.
/// Sync attempts run as queued tasks on the repository's single writer, so
/// they never race a concurrent `put`.
pub struct SyncSession {
    repo: Repository,
    options: SyncOptions,
    handlers: RefCell<Vec<Option<Handler>>>,
    paused: Cell<bool>,
    canceled: Cell<bool>,
    last_run_ms: Cell<i64>,
}

/// Which side of a sync actually moved, mapped onto the `change` family of
/// events this session fires.
fn change_kind(action: SyncAction) -> Option<SyncEventKind> {
    match action {
        SyncAction::NoOp => None,
        SyncAction::FastForward => Some(SyncEventKind::RemoteChange),
        SyncAction::PushOnly => Some(SyncEventKind::LocalChange),
        SyncAction::ThreeWayMerge => Some(SyncEventKind::Change),
    }
}

impl SyncSession {
    /// Open a session against `repo` with the given `options`. Does not sync
    /// immediately; call [`Self::try_sync`] or [`Self::try_push`].
    #[must_use]
    pub fn new(repo: Repository, options: SyncOptions) -> Self {
        Self {
            repo,
            options,
            handlers: RefCell::new(Vec::new()),
            paused: Cell::new(false),
            canceled: Cell::new(false),
            last_run_ms: Cell::new(0),
        }
    }

    /// Subscribe to one kind of event. Returns an id for [`Self::off`].
    pub fn on(&self, kind: SyncEventKind, callback: impl Fn(&SyncEvent) + 'static) -> HandlerId {
        let mut handlers = self.handlers.borrow_mut();
        handlers.push(Some(Handler { kind, callback: Box::new(callback) }));
        HandlerId(handlers.len() - 1)
    }

    /// Unsubscribe a handler previously returned by [`Self::on`].
    pub fn off(&self, id: HandlerId) {
        if let Some(slot) = self.handlers.borrow_mut().get_mut(id.0) {
            *slot = None;
        }
    }

    fn fire(&self, event: &SyncEvent) {
        for handler in self.handlers.borrow().iter().flatten() {
            if handler.kind == event.kind() {
                (handler.callback)(event);
            }
        }
    }

    /// Pause live syncing. Idempotent; fires `paused` only on the transition.
    pub fn pause(&self) {
        if !self.paused.replace(true) {
            self.fire(&SyncEvent::StateChange(SyncEventKind::Paused, self.meta("")));
        }
    }

    /// Resume after [`Self::pause`]. A no-op once [`Self::cancel`] has run.
    pub fn resume(&self) {
        if self.canceled.get() {
            return;
        }
        if self.paused.replace(false) {
            self.fire(&SyncEvent::StateChange(SyncEventKind::Active, self.meta("")));
        }
    }

    /// Permanently stop live syncing; [`Self::resume`] afterward has no effect.
    pub fn cancel(&self) {
        self.canceled.set(true);
        self.pause();
    }

    fn meta(&self, task_id: &str) -> TaskMetadata {
        TaskMetadata { task_id: task_id.to_owned(), remote: self.options.remote_url.clone() }
    }

    /// Run one full `trySync` attempt: fetch, classify, merge/push as needed,
    /// retrying recoverable failures per [`SyncOptions::retry`].
    ///
    /// # Errors
    /// Propagates whatever `trySync` itself returns after retries are
    /// exhausted; fires a `start`/`complete` or `start`/`error` pair either way.
    pub fn try_sync(&self) -> Result<SyncResult, Error> {
        self.run(TaskLabel::Sync, {
            let direction = self.options.sync_direction;
            let strategy = self.options.conflict_resolution_strategy;
            let no_merge_base = self.options.no_merge_base_behavior;
            move |git, working_dir, remote| engine::try_sync(git, working_dir, remote, direction, strategy, no_merge_base)
                .map(|(result, _conflicts)| result)
        })
    }

    /// Run the push half alone, per [`SyncOptions`]'s retry policy.
    ///
    /// # Errors
    /// Propagates [`Error::CannotPushBecauseUnfetchedCommitExists`] (after
    /// retries) if the remote has commits this repository hasn't fetched.
    pub fn try_push(&self) -> Result<SyncResult, Error> {
        self.run(TaskLabel::Push, |git, _working_dir, remote| engine::try_push(git, remote))
    }

    fn run(
        &self,
        label: TaskLabel,
        op: impl Fn(&dyn gitddb_git::GitRepo, &std::path::Path, &str) -> Result<SyncResult, Error> + 'static,
    ) -> Result<SyncResult, Error> {
        let git = std::rc::Rc::clone(self.repo.git_handle());
        let queue = std::rc::Rc::clone(self.repo.queue_handle());
        let working_dir = self.repo.working_dir().to_path_buf();
        let remote = self.options.remote_url.clone();
        let attempts = self.options.retry + 1;
        let delay = std::time::Duration::from_millis(self.options.retry_interval_ms);
        let task_id = queue.new_task_id();

        self.fire(&SyncEvent::Start(self.meta(&task_id)));

        let task = Task {
            label,
            task_id: task_id.clone(),
            target_id: None,
            collection_path: String::new(),
            short_name: None,
            sync_remote_name: Some(remote.clone()),
            enqueue_time: 0,
            debounce_time: None,
            func: Some(Box::new(move || {
                with_retry(attempts, delay, || op(git.as_ref(), &working_dir, &remote)).map(TaskResult::Sync)
            })),
            enqueue_callback: None,
            completion: None,
        };

        let meta = self.meta(&task_id);
        match queue.push_and_wait(task) {
            Ok(TaskResult::Sync(result)) => {
                self.last_run_ms.set(now_ms());
                if let Some(kind) = change_kind(result.action) {
                    self.fire(&SyncEvent::Change(kind, result.clone(), meta.clone()));
                }
                self.fire(&SyncEvent::Complete(meta));
                Ok(result)
            }
            Ok(TaskResult::Crud(_)) => unreachable!("a sync/push task always produces a SyncResult"),
            Err(e) => {
                self.fire(&SyncEvent::Error(SyncErrorInfo { message: e.to_string() }, meta));
                Err(e)
            }
        }
    }

    /// Run `try_sync` if live mode is enabled, unpaused, uncancelled, and
    /// [`SyncOptions::live_interval_ms`] has elapsed since the last attempt.
    /// Intended to be polled by the host on whatever cadence it likes (there
    /// is no internal timer); a no-op tick returns `None`.
    pub fn live_tick(&self) -> Option<Result<SyncResult, Error>> {
        let interval = self.options.live_interval_ms?;
        if self.paused.get() || self.canceled.get() {
            return None;
        }
        if now_ms() - self.last_run_ms.get() < i64::try_from(interval).unwrap_or(i64::MAX) {
            return None;
        }
        Some(self.try_sync())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepositoryOptions, SyncDirection};
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc;

    fn bare_remote() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        std::process::Command::new("git")
            .args(["init", "--bare", dir.path().to_str().unwrap()])
            .output()
            .unwrap();
        let url = dir.path().to_string_lossy().into_owned();
        (dir, url)
    }

    fn open_repo(dir: &std::path::Path) -> Repository {
        let mut opts = RepositoryOptions::new("testdb");
        opts.local_dir = dir.to_path_buf();
        Repository::open(opts).unwrap()
    }

    #[test]
    fn push_only_session_fires_start_local_change_complete() {
        let (remote_dir, remote_url) = bare_remote();
        let local_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(local_dir.path());
        repo.put(serde_json::json!({"name": "a"})).unwrap();

        let mut options = SyncOptions::new(remote_url);
        options.sync_direction = SyncDirection::Push;
        let session = SyncSession::new(repo, options);

        let events: Rc<StdRefCell<Vec<SyncEventKind>>> = Rc::new(StdRefCell::new(Vec::new()));
        for kind in [SyncEventKind::Start, SyncEventKind::LocalChange, SyncEventKind::Complete] {
            let events = Rc::clone(&events);
            session.on(kind, move |event| events.borrow_mut().push(event.kind()));
        }

        let result = session.try_push().unwrap();
        assert_eq!(result.action, SyncAction::PushOnly);
        assert_eq!(
            *events.borrow(),
            vec![SyncEventKind::Start, SyncEventKind::LocalChange, SyncEventKind::Complete]
        );
        drop(remote_dir);
    }

    #[test]
    fn pull_fast_forwards_onto_a_cloned_remotes_new_commit() {
        let (remote_dir, remote_url) = bare_remote();
        let source_dir = tempfile::tempdir().unwrap();
        let source = open_repo(source_dir.path());
        source.put(serde_json::json!({"name": "seed"})).unwrap();
        let mut push_opts = SyncOptions::new(remote_url.clone());
        push_opts.sync_direction = SyncDirection::Push;
        SyncSession::new(source.clone(), push_opts).try_push().unwrap();

        let local_dir = tempfile::tempdir().unwrap();
        let clone_target = local_dir.path().join("testdb");
        let clone_ok = std::process::Command::new("git")
            .args(["clone", "--branch", "main", &remote_url, clone_target.to_str().unwrap()])
            .output()
            .unwrap();
        assert!(clone_ok.status.success());
        std::process::Command::new("git")
            .args(["-C", clone_target.to_str().unwrap(), "config", "user.name", "t"])
            .output()
            .unwrap();
        std::process::Command::new("git")
            .args(["-C", clone_target.to_str().unwrap(), "config", "user.email", "t@t"])
            .output()
            .unwrap();
        let repo = open_repo(local_dir.path());

        source.put(serde_json::json!({"name": "update"})).unwrap();
        let mut push_opts2 = SyncOptions::new(remote_url.clone());
        push_opts2.sync_direction = SyncDirection::Push;
        SyncSession::new(source, push_opts2).try_push().unwrap();

        let session = SyncSession::new(repo, SyncOptions::new(remote_url));
        let events: Rc<StdRefCell<Vec<SyncEventKind>>> = Rc::new(StdRefCell::new(Vec::new()));
        let recorded = Rc::clone(&events);
        session.on(SyncEventKind::RemoteChange, move |event| recorded.borrow_mut().push(event.kind()));

        let result = session.try_sync().unwrap();
        assert_eq!(result.action, SyncAction::FastForward);
        assert_eq!(*events.borrow(), vec![SyncEventKind::RemoteChange]);
        drop(remote_dir);
    }

    #[test]
    fn divergent_edits_merge_and_resolve_by_default_strategy() {
        let (remote_dir, remote_url) = bare_remote();
        let source_dir = tempfile::tempdir().unwrap();
        let source = open_repo(source_dir.path());
        source.put(serde_json::json!({"_id": "1", "name": "base"})).unwrap();
        let mut push_opts = SyncOptions::new(remote_url.clone());
        push_opts.sync_direction = SyncDirection::Push;
        SyncSession::new(source.clone(), push_opts).try_push().unwrap();

        let local_dir = tempfile::tempdir().unwrap();
        let clone_target = local_dir.path().join("testdb");
        let clone_ok = std::process::Command::new("git")
            .args(["clone", "--branch", "main", &remote_url, clone_target.to_str().unwrap()])
            .output()
            .unwrap();
        assert!(clone_ok.status.success());
        std::process::Command::new("git")
            .args(["-C", clone_target.to_str().unwrap(), "config", "user.name", "t"])
            .output()
            .unwrap();
        std::process::Command::new("git")
            .args(["-C", clone_target.to_str().unwrap(), "config", "user.email", "t@t"])
            .output()
            .unwrap();
        let replica_b = open_repo(local_dir.path());

        // A edits and pushes first.
        source.put(serde_json::json!({"_id": "1", "name": "fromA"})).unwrap();
        let mut push_opts2 = SyncOptions::new(remote_url.clone());
        push_opts2.sync_direction = SyncDirection::Push;
        SyncSession::new(source, push_opts2).try_push().unwrap();

        // B edits independently, diverging from the same base.
        replica_b.put(serde_json::json!({"_id": "1", "name": "fromB"})).unwrap();

        let session = SyncSession::new(replica_b.clone(), SyncOptions::new(remote_url));
        let result = session.try_sync().unwrap();
        assert_eq!(result.action, SyncAction::ThreeWayMerge);

        // Default strategy is `Ours`: B's own edit survives the merge.
        let doc = replica_b.get("1").unwrap().unwrap();
        assert_eq!(doc.body["name"], "fromB");
        drop(remote_dir);
    }

    #[test]
    fn pause_then_live_tick_is_a_no_op() {
        let (_remote_dir, remote_url) = bare_remote();
        let local_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(local_dir.path());

        let mut options = SyncOptions::new(remote_url);
        options.live_interval_ms = Some(0);
        let session = SyncSession::new(repo, options);
        session.pause();
        assert!(session.live_tick().is_none());
    }

    #[test]
    fn off_stops_delivering_events() {
        let (_remote_dir, remote_url) = bare_remote();
        let local_dir = tempfile::tempdir().unwrap();
        let repo = open_repo(local_dir.path());

        let mut options = SyncOptions::new(remote_url);
        options.sync_direction = SyncDirection::Push;
        let session = SyncSession::new(repo, options);

        let count = Rc::new(Cell::new(0));
        let handle = {
            let count = Rc::clone(&count);
            session.on(SyncEventKind::Start, move |_| count.set(count.get() + 1))
        };
        session.off(handle);
        let _ = session.try_push();
        assert_eq!(count.get(), 0);
    }
}
