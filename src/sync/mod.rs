//! Sync engine (§4.7): fetch/merge/push state machine, three-way merge, and
//! the event-subscribing session that drives it.

mod engine;
mod event;
mod merge;
mod session;

pub use event::{SyncErrorInfo, SyncEvent, SyncEventKind, TaskMetadata};
pub use merge::{Conflict, ConflictOperation};
pub use session::{HandlerId, SyncSession};
