//! Task descriptor: label, targeting, timing, and the boxed unit of work.
//!
//! The queue is a single-threaded cooperative executor (§4.3), so none of
//! this needs to be `Send`: a task's closure runs to completion on whichever
//! thread calls [`crate::queue::TaskQueue::push`] or
//! [`crate::queue::TaskQueue::tick`], the same thread that constructed it.

use crate::error::Error;

/// The six task labels recognized by the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskLabel {
    /// Upsert.
    Put,
    /// Create, failing if present.
    Insert,
    /// Modify, failing if absent.
    Update,
    /// Remove.
    Delete,
    /// Push-only sync.
    Push,
    /// Full fetch/merge/push sync.
    Sync,
}

impl TaskLabel {
    /// Whether this label participates in debounce look-ahead collapsing
    /// (§4.3 step 2b). Per the resolved open question (see DESIGN.md),
    /// `insert` does **not** participate: an insert must observe every
    /// preceding write to detect `SameIdExists` correctly, so it always
    /// runs rather than being superseded or superseding others.
    #[must_use]
    pub const fn debounces(self) -> bool {
        matches!(self, Self::Put | Self::Update)
    }

    /// Whether two tasks with this label targeting the same remote collapse
    /// at enqueue time (§4.3 step 1).
    #[must_use]
    pub const fn is_remote_op(self) -> bool {
        matches!(self, Self::Push | Self::Sync)
    }
}

/// Current lifecycle state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the queue.
    Pending,
    /// Currently executing.
    Running,
    /// Completed (successfully or not).
    Done,
    /// Canceled before it ran.
    Canceled,
}

/// A single unit of queued work.
///
/// `T` is the result payload a completed task produces (see
/// [`crate::stats::TaskResult`] for the concrete type the repository uses).
pub struct Task<T> {
    /// The task's label, used for debounce/skip policy and statistics.
    pub label: TaskLabel,
    /// Monotonic, lexicographically sortable id.
    pub task_id: String,
    /// The document id this task targets, if any (CRUD tasks only).
    pub target_id: Option<String>,
    /// Normalized collection path this task targets.
    pub collection_path: String,
    /// `<collectionPath><shortId>`, used as the debounce collapse key.
    pub short_name: Option<String>,
    /// Remote name this task targets, for push/sync debounce collapsing.
    pub sync_remote_name: Option<String>,
    /// Wall-clock milliseconds at enqueue time.
    pub enqueue_time: i64,
    /// Debounce window in ms; `None`/negative disables debouncing for this task.
    pub debounce_time: Option<i64>,
    /// The unit of work. Taken (and run) exactly once.
    pub func: Option<Box<dyn FnOnce() -> Result<T, Error>>>,
    /// Invoked once, right after enqueue, before any task runs. Errors from
    /// the callback itself are logged, never propagated.
    pub enqueue_callback: Option<Box<dyn FnOnce()>>,
    /// Invoked exactly once with the task's outcome: on success, on failure,
    /// or on cancellation (with [`Error::TaskCancel`] or the specific reason).
    pub completion: Option<Box<dyn FnOnce(Result<T, Error>)>>,
}

impl<T> Task<T> {
    /// The debounce collapse key: `(collection_path, short_name)`.
    #[must_use]
    pub fn debounce_key(&self) -> Option<(&str, &str)> {
        self.short_name.as_deref().map(|n| (self.collection_path.as_str(), n))
    }

    /// Fulfil this task's waiter (if any) with its outcome.
    pub fn complete(mut self, result: Result<T, Error>) {
        if let Some(cb) = self.completion.take() {
            cb(result);
        }
    }

    /// Cancel this task: deliver `reason` to its waiter without running `func`.
    pub fn cancel(self, reason: Error) {
        self.complete(Err(reason));
    }
}
