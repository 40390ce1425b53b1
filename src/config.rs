//! Per-constructor option structs (`RepositoryOptions`, `PutOptions`, ...).
//!
//! `RepositoryOptions` is loadable from a `gitddb.toml` file, grounded in
//! the teacher's `ManifoldConfig::load`/`parse` pattern: a missing file
//! yields all defaults, a malformed one surfaces a `ConfigError` with
//! line-level detail.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::id::IdGenerator;

/// Serialization format for document bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Serialize {
    /// Plain JSON (the only format implemented).
    #[default]
    Json,
    /// Markdown front-matter (recognized, not yet implemented).
    FrontMatter,
}

impl Serialize {
    /// The file extension associated with this serialization format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => ".json",
            Self::FrontMatter => ".md",
        }
    }
}

/// Options accepted by `Repository::open`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryOptions {
    /// Database name (required).
    pub db_name: String,

    /// Parent directory the database lives under.
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Document serialization format.
    #[serde(default)]
    pub serialize: Serialize,

    /// Default debounce window (ms) applied to `put`/`update` tasks that
    /// don't specify their own.
    #[serde(default)]
    pub debounce_time: Option<i64>,

    /// Whether `open` may initialize a new repository if none exists.
    #[serde(default = "default_true")]
    pub create_if_not_exists: bool,
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./git-documentdb")
}

const fn default_true() -> bool {
    true
}

impl RepositoryOptions {
    /// Build options with just a database name, all else defaulted.
    #[must_use]
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            local_dir: default_local_dir(),
            serialize: Serialize::default(),
            debounce_time: None,
            create_if_not_exists: true,
        }
    }

    /// The full working directory path: `<local_dir>/<db_name>`.
    #[must_use]
    pub fn working_dir(&self) -> PathBuf {
        self.local_dir.join(&self.db_name)
    }
}

/// Precedence rule for `put`-family calls that accept both a standalone id
/// and a document carrying its own `_id`: an explicit id always wins,
/// without mutating the caller's document (§9 "method overloading").
#[derive(Clone, Default)]
pub struct PutOptions {
    /// Overrides the auto-generated commit message.
    pub commit_message: Option<String>,
    /// Caller-supplied task id (otherwise one is generated).
    pub task_id: Option<String>,
    /// Debounce window in ms; `Some(0)` disables debouncing for this call.
    pub debounce_time: Option<i64>,
    /// Force `put` to behave as an explicit `insert` or `update` rather than
    /// auto-detecting from file presence.
    pub insert_or_update: Option<InsertOrUpdate>,
    /// Invoked once the task is enqueued, before it runs.
    pub enqueue_callback: Option<std::rc::Rc<dyn Fn()>>,
}

impl fmt::Debug for PutOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutOptions")
            .field("commit_message", &self.commit_message)
            .field("task_id", &self.task_id)
            .field("debounce_time", &self.debounce_time)
            .field("insert_or_update", &self.insert_or_update)
            .field("enqueue_callback", &self.enqueue_callback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Explicit insert/update override for `put`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOrUpdate {
    /// Fail if the document already exists.
    Insert,
    /// Fail if the document does not exist.
    Update,
}

/// Conflict resolution policy for three-way merges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictResolutionStrategy {
    /// Keep the local replica's version (default).
    #[default]
    Ours,
    /// Keep the remote replica's version.
    Theirs,
}

/// What to do when `trySync` finds no common ancestor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoMergeBaseBehavior {
    /// Abort with `NoMergeBaseFound` (the only supported behavior; see
    /// DESIGN.md open-question decision).
    #[default]
    Abort,
}

/// Direction a sync session is allowed to move data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncDirection {
    /// Fetch and merge remote changes in, but never push.
    Pull,
    /// Push local changes out, but never fetch.
    Push,
    /// Fetch, merge, and push (the default).
    #[default]
    Both,
}

/// Options accepted by `Repository::sync` / `SyncSession::new`.
#[derive(Clone, Debug)]
pub struct SyncOptions {
    /// The remote's fetch/push URL (used as the remote name too).
    pub remote_url: String,
    /// How many times to retry a recoverable sync failure.
    pub retry: u32,
    /// Delay in ms between retries.
    pub retry_interval_ms: u64,
    /// Which direction(s) this session is allowed to move data.
    pub sync_direction: SyncDirection,
    /// Conflict policy applied during three-way merge.
    pub conflict_resolution_strategy: ConflictResolutionStrategy,
    /// Live periodic sync interval in ms; `None` disables live mode.
    pub live_interval_ms: Option<u64>,
    /// Policy when no merge base exists.
    pub no_merge_base_behavior: NoMergeBaseBehavior,
}

impl SyncOptions {
    /// Build options with just a remote URL, all else defaulted.
    #[must_use]
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            retry: 3,
            retry_interval_ms: 1000,
            sync_direction: SyncDirection::default(),
            conflict_resolution_strategy: ConflictResolutionStrategy::default(),
            live_interval_ms: None,
            no_merge_base_behavior: NoMergeBaseBehavior::default(),
        }
    }
}

/// Error loading a `gitddb.toml` configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded, if available.
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl RepositoryOptions {
    /// Load options from a `gitddb.toml` file, falling back to `db_name`
    /// with all defaults if the file does not exist.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file exists but is malformed, or is
    /// missing the required `db_name` field.
    pub fn load(path: &Path, db_name_fallback: &str) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new(db_name_fallback));
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        toml::from_str(&contents).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = contents[..span.start].chars().filter(|&c| c == '\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: Some(path.to_owned()),
                message,
            }
        })
    }
}

/// Shared id generator for `dbId`/`taskId` stamping, held by the repository handle.
#[must_use]
pub fn new_id_generator() -> IdGenerator {
    IdGenerator::new()
}
