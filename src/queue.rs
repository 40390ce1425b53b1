//! The task queue: a single-threaded cooperative executor with debounce
//! collapsing, push-triggered scheduling, and running statistics.
//!
//! Scheduling runs synchronously inside [`TaskQueue::push`] and
//! [`TaskQueue::tick`] rather than on a background thread — there is no
//! event loop in this crate, so "run on push, or on a fixed tick" (the
//! scheduling rule is explicitly implementation-free) becomes "run inline,
//! or when the host calls `tick()`". This matches §4.3's own framing as a
//! single-threaded cooperative executor: everything here is confined to one
//! thread, guarded by a `RefCell` rather than a `Mutex`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::Error;
use crate::id::IdGenerator;
use crate::stats::QueueStatistics;
use crate::task::{Task, TaskLabel};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as i64
}

struct QueueState<T> {
    pending: VecDeque<Task<T>>,
    running: bool,
    current_task_id: Option<String>,
    /// `(label, remote)` of the task currently running, for the §4.3 step 1
    /// "or the running task if the queue is empty" dedup check.
    running_remote_op: Option<(TaskLabel, Option<String>)>,
    stats: QueueStatistics,
    accepting: bool,
}

/// The repository's single writer. All mutation of the working directory and
/// git index passes through here, one task at a time.
pub struct TaskQueue<T> {
    state: RefCell<QueueState<T>>,
    id_gen: Rc<IdGenerator>,
}

impl<T: 'static> TaskQueue<T> {
    /// Build an empty, running queue sharing `id_gen` with the repository
    /// handle (so `taskId` and `dbId` draw from the same monotonic sequence).
    #[must_use]
    pub fn new(id_gen: Rc<IdGenerator>) -> Self {
        Self {
            state: RefCell::new(QueueState {
                pending: VecDeque::new(),
                running: false,
                current_task_id: None,
                running_remote_op: None,
                stats: QueueStatistics::default(),
                accepting: true,
            }),
            id_gen,
        }
    }

    /// Stamp a fresh monotonic task id.
    #[must_use]
    pub fn new_task_id(&self) -> String {
        self.id_gen.next()
    }

    /// The monotonic factory's current reading, used to stamp `enqueueTime`.
    #[must_use]
    pub fn get_enqueue_time(&self) -> i64 {
        now_ms()
    }

    /// Number of tasks currently pending (not counting a running task).
    #[must_use]
    pub fn length(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Snapshot of per-label completion/cancellation counts.
    #[must_use]
    pub fn current_statistics(&self) -> QueueStatistics {
        self.state.borrow().stats
    }

    /// The id of the task currently running, if any.
    #[must_use]
    pub fn current_task_id(&self) -> Option<String> {
        self.state.borrow().current_task_id.clone()
    }

    /// Enqueue a task, stamping its `enqueueTime`, then try to run whatever in
    /// the queue is immediately eligible.
    pub fn push(&self, mut task: Task<T>) {
        let callback = {
            let mut state = self.state.borrow_mut();

            if !state.accepting {
                drop(state);
                task.cancel(Error::TaskCancel);
                return;
            }

            if task.label.is_remote_op() {
                let matches = state.pending.back().is_some_and(|t| {
                    t.label == task.label && t.sync_remote_name == task.sync_remote_name
                }) || (state.pending.is_empty()
                    && state.running_remote_op.as_ref() == Some(&(task.label, task.sync_remote_name.clone())));
                if matches {
                    state.stats.record_canceled();
                    drop(state);
                    let remote = task.sync_remote_name.clone().unwrap_or_default();
                    tracing::debug!(target: "gitddb::queue", task_id = %task.task_id, %remote, "consecutive sync skipped");
                    task.cancel(Error::ConsecutiveSyncSkipped { remote });
                    return;
                }
            }

            task.enqueue_time = self.get_enqueue_time();
            let callback = task.enqueue_callback.take();
            tracing::debug!(target: "gitddb::queue", task_id = %task.task_id, label = ?task.label, "enqueued");
            state.pending.push_back(task);
            callback
        };

        if let Some(cb) = callback {
            cb();
        }

        self.schedule();
    }

    /// Enqueue a task and block the calling thread until it completes
    /// (successfully, with an error, or via cancellation), ticking the queue
    /// while waiting so debounce-delayed tasks eventually run.
    pub fn push_and_wait(&self, mut task: Task<T>) -> Result<T, Error> {
        let slot: Rc<RefCell<Option<Result<T, Error>>>> = Rc::new(RefCell::new(None));
        let slot_for_completion = Rc::clone(&slot);
        task.completion = Some(Box::new(move |result| {
            *slot_for_completion.borrow_mut() = Some(result);
        }));
        self.push(task);
        loop {
            if let Some(result) = slot.borrow_mut().take() {
                return result;
            }
            sleep(Duration::from_millis(20));
            self.tick();
        }
    }

    /// Try to run whatever is immediately eligible.
    pub fn tick(&self) {
        self.schedule();
    }

    fn schedule(&self) {
        loop {
            let (task, label) = {
                let mut state = self.state.borrow_mut();
                if state.running {
                    return;
                }
                let now = now_ms();
                let QueueState { pending, stats, .. } = &mut *state;
                let Some(found) = find_runnable(pending, now, stats) else {
                    return;
                };
                state.running = true;
                state.current_task_id = Some(found.0.task_id.clone());
                state.running_remote_op = found.0.label.is_remote_op().then(|| {
                    (found.0.label, found.0.sync_remote_name.clone())
                });
                found
            };

            let Task { task_id, func, completion, .. } = task;
            tracing::debug!(target: "gitddb::queue", %task_id, ?label, "running");
            let result = func.expect("queued task must carry its work closure")();
            if let Err(e) = &result {
                tracing::debug!(target: "gitddb::queue", %task_id, ?label, error = %e, "task failed");
            }
            if let Some(cb) = completion {
                cb(result);
            }

            let mut state = self.state.borrow_mut();
            state.running = false;
            state.current_task_id = None;
            state.running_remote_op = None;
            state.stats.record_completed(label);
        }
    }

    /// Cancel every pending task (their waiter receives [`Error::TaskCancel`]),
    /// clear statistics, and stop accepting new tasks until [`Self::start`].
    pub fn stop(&self) {
        let canceled: Vec<_> = {
            let mut state = self.state.borrow_mut();
            state.accepting = false;
            let drained: Vec<_> = state.pending.drain(..).collect();
            state.stats = QueueStatistics::default();
            drained
        };
        tracing::debug!(target: "gitddb::queue", canceled = canceled.len(), "stopped");
        for task in canceled {
            task.cancel(Error::TaskCancel);
        }
    }

    /// Resume accepting tasks after [`Self::stop`].
    pub fn start(&self) {
        self.state.borrow_mut().accepting = true;
    }

    /// Poll every 100 ms until the queue is empty and idle, or `timeout`
    /// elapses. Returns `true` if it timed out.
    pub fn wait_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.tick();
            let idle = {
                let state = self.state.borrow();
                state.pending.is_empty() && !state.running
            };
            if idle {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            sleep(Duration::from_millis(100).min(remaining));
        }
    }
}

/// Apply the §4.3 scheduling walk: find one task to run now, canceling any
/// superseded `put`/`update` heads encountered along the way. Returns the
/// task to run plus its label (recorded in statistics only after it finishes).
fn find_runnable<T>(
    pending: &mut VecDeque<Task<T>>,
    now: i64,
    stats: &mut QueueStatistics,
) -> Option<(Task<T>, TaskLabel)> {
    let mut i = 0;
    while i < pending.len() {
        let debounced = pending[i].label.debounces()
            && pending[i].debounce_time.is_some_and(|d| d >= 0);
        if !debounced {
            let task = pending.remove(i)?;
            let label = task.label;
            return Some((task, label));
        }

        let window_end = pending[i].enqueue_time + pending[i].debounce_time.unwrap_or(0);
        let key = pending[i].debounce_key().map(|(c, s)| (c.to_owned(), s.to_owned()));

        let mut lookahead = None;
        for j in (i + 1)..pending.len() {
            if pending[j].enqueue_time > window_end {
                break;
            }
            if pending[j].debounce_key().map(|(c, s)| (c.to_owned(), s.to_owned())) == key {
                lookahead = Some(pending[j].label);
                break;
            }
        }

        match lookahead {
            Some(TaskLabel::Put | TaskLabel::Update) => {
                let superseded = pending.remove(i)?;
                stats.record_canceled();
                superseded.cancel(Error::TaskCancel);
                // same index now refers to the next task; keep walking.
            }
            Some(_) => {
                let task = pending.remove(i)?;
                let label = task.label;
                return Some((task, label));
            }
            None => {
                if window_end <= now {
                    let task = pending.remove(i)?;
                    let label = task.label;
                    return Some((task, label));
                }
                i += 1;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> TaskQueue<i32> {
        TaskQueue::new(Rc::new(IdGenerator::new()))
    }

    fn task(label: TaskLabel, id: &str) -> Task<i32> {
        let id_owned = id.to_owned();
        Task {
            label,
            task_id: id.to_owned(),
            target_id: Some(id.to_owned()),
            collection_path: String::new(),
            short_name: Some(id.to_owned()),
            sync_remote_name: None,
            enqueue_time: 0,
            debounce_time: None,
            func: Some(Box::new(move || Ok(id_owned.len() as i32))),
            enqueue_callback: None,
            completion: None,
        }
    }

    #[test]
    fn runs_non_debounced_task_immediately() {
        let q = queue();
        let result = q.push_and_wait(task(TaskLabel::Insert, "a"));
        assert_eq!(result.unwrap(), 1);
        assert_eq!(q.current_statistics().insert, 1);
    }

    #[test]
    fn debounced_put_waits_out_its_window() {
        let q = queue();
        let mut t = task(TaskLabel::Put, "a");
        t.debounce_time = Some(50);
        q.push(t);
        // not yet expired: still pending
        assert_eq!(q.length(), 1);
        let timed_out = q.wait_completion(Duration::from_millis(500));
        assert!(!timed_out);
        assert_eq!(q.current_statistics().put, 1);
    }

    #[test]
    fn second_put_to_same_key_supersedes_first() {
        let q = queue();
        let mut t1 = task(TaskLabel::Put, "a");
        t1.debounce_time = Some(10_000);
        let slot1 = Rc::new(RefCell::new(None));
        let slot1c = Rc::clone(&slot1);
        t1.completion = Some(Box::new(move |r| *slot1c.borrow_mut() = Some(r)));
        q.push(t1);

        let mut t2 = task(TaskLabel::Put, "a");
        t2.debounce_time = Some(10_000);
        q.push(t2);

        let outcome = slot1.borrow_mut().take().unwrap();
        assert!(matches!(outcome, Err(Error::TaskCancel)));
        assert_eq!(q.current_statistics().cancel, 1);
        // t2 still pending, not yet expired
        assert_eq!(q.length(), 1);
    }

    #[test]
    fn n_consecutive_debounced_puts_run_only_the_last() {
        let q = queue();
        const N: usize = 25;
        let mut last_slot = None;
        for i in 0..N {
            let mut t = task(TaskLabel::Put, "a");
            t.debounce_time = Some(50);
            if i + 1 == N {
                let slot = Rc::new(RefCell::new(None));
                let slotc = Rc::clone(&slot);
                t.completion = Some(Box::new(move |r| *slotc.borrow_mut() = Some(r)));
                last_slot = Some(slot);
            }
            q.push(t);
        }

        assert_eq!(q.current_statistics().cancel, (N - 1) as u64);
        assert_eq!(q.current_statistics().put, 0);
        assert_eq!(q.length(), 1);

        // the surviving task has not run yet (still debouncing); wait it out.
        q.wait_completion(Duration::from_millis(500));
        assert_eq!(q.current_statistics().put, 1);
        assert!(last_slot.unwrap().borrow_mut().take().unwrap().is_ok());
    }

    #[test]
    fn delete_after_debounced_put_runs_the_put_immediately() {
        let q = queue();
        let mut t1 = task(TaskLabel::Put, "a");
        t1.debounce_time = Some(10_000);
        let slot1 = Rc::new(RefCell::new(None));
        let slot1c = Rc::clone(&slot1);
        t1.completion = Some(Box::new(move |r| *slot1c.borrow_mut() = Some(r)));
        q.push(t1);

        let result2 = q.push_and_wait(task(TaskLabel::Delete, "a"));
        assert_eq!(result2.unwrap(), 1);
        assert_eq!(slot1.borrow_mut().take().unwrap().unwrap(), 1);
    }

    #[test]
    fn reentrant_sync_to_same_remote_is_skipped() {
        // The queue is single-threaded and cooperative: the only way a second
        // task can observe "a task is currently running" is if the running
        // task's own closure re-enters the queue, e.g. a sync scheduling
        // another sync against the same remote while mid-flight.
        let q = Rc::new(queue());
        let qc = Rc::clone(&q);
        let inner_result: Rc<RefCell<Option<Result<i32, Error>>>> = Rc::new(RefCell::new(None));
        let inner_result_c = Rc::clone(&inner_result);

        let mut outer = task(TaskLabel::Sync, "outer");
        outer.sync_remote_name = Some("origin".to_owned());
        outer.short_name = None;
        outer.func = Some(Box::new(move || {
            let mut inner = task(TaskLabel::Sync, "inner");
            inner.sync_remote_name = Some("origin".to_owned());
            inner.short_name = None;
            let slot = Rc::clone(&inner_result_c);
            inner.completion = Some(Box::new(move |r| *slot.borrow_mut() = Some(r)));
            qc.push(inner);
            Ok(1)
        }));

        q.push(outer);
        assert!(matches!(
            inner_result.borrow_mut().take().unwrap(),
            Err(Error::ConsecutiveSyncSkipped { .. })
        ));
    }

    #[test]
    fn reentrant_push_to_same_remote_is_skipped() {
        // Mirrors `reentrant_sync_to_same_remote_is_skipped` for `Push`: a
        // `tryPush` that schedules another `tryPush` against the same remote
        // while still running observes the first one still in flight.
        let q = Rc::new(queue());
        let qc = Rc::clone(&q);
        let inner_result: Rc<RefCell<Option<Result<i32, Error>>>> = Rc::new(RefCell::new(None));
        let inner_result_c = Rc::clone(&inner_result);

        let mut outer = task(TaskLabel::Push, "outer");
        outer.sync_remote_name = Some("origin".to_owned());
        outer.short_name = None;
        outer.func = Some(Box::new(move || {
            let mut inner = task(TaskLabel::Push, "inner");
            inner.sync_remote_name = Some("origin".to_owned());
            inner.short_name = None;
            let slot = Rc::clone(&inner_result_c);
            inner.completion = Some(Box::new(move |r| *slot.borrow_mut() = Some(r)));
            qc.push(inner);
            Ok(1)
        }));

        q.push(outer);
        assert!(matches!(
            inner_result.borrow_mut().take().unwrap(),
            Err(Error::ConsecutiveSyncSkipped { .. })
        ));
        assert_eq!(q.current_statistics().cancel, 1);
        assert_eq!(q.current_statistics().push, 1);
    }

    #[test]
    fn stop_cancels_pending_tasks() {
        let q = queue();
        let mut t = task(TaskLabel::Put, "a");
        t.debounce_time = Some(10_000);
        let slot = Rc::new(RefCell::new(None));
        let slotc = Rc::clone(&slot);
        t.completion = Some(Box::new(move |r| *slotc.borrow_mut() = Some(r)));
        q.push(t);
        q.stop();
        assert!(matches!(slot.borrow_mut().take().unwrap(), Err(Error::TaskCancel)));
        assert_eq!(q.length(), 0);
    }

    #[test]
    fn wait_completion_returns_false_when_idle() {
        let q = queue();
        assert!(!q.wait_completion(Duration::from_millis(50)));
    }
}
