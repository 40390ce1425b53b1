//! Unified error type for the document database.
//!
//! Grouped by layer per the error taxonomy: validation, storage, lifecycle,
//! queue, sync. Every public operation returns `Result<T, Error>`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by `gitddb` operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Validation ---
    /// A document was submitted without an `_id` and none could be inferred.
    #[error("document has no _id and none could be generated")]
    UndefinedDocumentId,

    /// An id contains a character that is not permitted.
    #[error("invalid id `{id}`: {reason}")]
    InvalidIdCharacter {
        /// The offending id.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An id exceeds the length budget derived from `MAX_FILE_PATH_LENGTH`.
    #[error("id `{id}` is too long: {len} bytes, max {max}")]
    InvalidIdLength {
        /// The offending id.
        id: String,
        /// Its length in bytes.
        len: usize,
        /// The maximum allowed length.
        max: usize,
    },

    /// A collection path contains a character that is not permitted.
    #[error("invalid collection path `{path}`: {reason}")]
    InvalidCollectionPathCharacter {
        /// The offending path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A collection path exceeds the length budget.
    #[error("collection path `{path}` is too long: {len} bytes, max {max}")]
    InvalidCollectionPathLength {
        /// The offending path.
        path: String,
        /// Its length in bytes.
        len: usize,
        /// The maximum allowed length.
        max: usize,
    },

    /// A database name contains a character that is not permitted.
    #[error("invalid db name `{name}`: {reason}")]
    InvalidDbNameCharacter {
        /// The offending name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A local directory path contains a character that is not permitted.
    #[error("invalid local dir `{dir}`: {reason}")]
    InvalidLocalDirCharacter {
        /// The offending directory.
        dir: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A document has a top-level key starting with `_` other than `_id`/`_deleted`.
    #[error("invalid property name `{name}` in document: reserved keys may not be used")]
    InvalidPropertyNameInDocument {
        /// The offending key.
        name: String,
    },

    /// A document could not be represented as a JSON object (cycles, non-finite numbers, etc).
    #[error("document could not be serialized to JSON: {reason}")]
    InvalidJsonObject {
        /// Why serialization failed.
        reason: String,
    },

    /// The configured serialization extension does not match `.json`.
    #[error("invalid JSON file extension: {ext}")]
    InvalidJsonFileExtension {
        /// The offending extension.
        ext: String,
    },

    // --- Storage ---
    /// The working directory could not be created.
    #[error("cannot create directory `{}`: {source}", path.display())]
    CannotCreateDirectory {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The repository could not be initialized.
    #[error("cannot create repository at `{}`: {reason}", path.display())]
    CannotCreateRepository {
        /// The repository root.
        path: PathBuf,
        /// Why creation failed.
        reason: String,
    },

    /// An existing repository could not be opened.
    #[error("cannot open repository at `{}`: {reason}", path.display())]
    CannotOpenRepository {
        /// The repository root.
        path: PathBuf,
        /// Why opening failed.
        reason: String,
    },

    /// `open({createIfNotExists: false})` found no repository.
    #[error("repository not found at `{}`", path.display())]
    RepositoryNotFound {
        /// The repository root that was probed.
        path: PathBuf,
    },

    /// An operation was attempted on a closed repository.
    #[error("repository is not open")]
    RepositoryNotOpen,

    /// A write to the working tree or Git object store failed.
    #[error("cannot write data for `{path}`: {reason}")]
    CannotWriteData {
        /// The document path being written.
        path: String,
        /// Why the write failed.
        reason: String,
    },

    /// A delete of the working tree or Git object store failed.
    #[error("cannot delete data for `{path}`: {reason}")]
    CannotDeleteData {
        /// The document path being deleted.
        path: String,
        /// Why the delete failed.
        reason: String,
    },

    /// `get`/`update`/`delete` targeted a document that does not exist.
    #[error("document not found: `{id}`")]
    DocumentNotFound {
        /// The short id that was looked up.
        id: String,
    },

    /// `insert` targeted a document whose id already exists.
    #[error("document already exists: `{id}`")]
    SameIdExists {
        /// The short id that collided.
        id: String,
    },

    /// The fully-qualified working directory path is too long to hold any document.
    #[error("working directory path is too long: {len} bytes, max {max}")]
    InvalidWorkingDirectoryPathLength {
        /// The working directory length in bytes.
        len: usize,
        /// The maximum allowed length.
        max: usize,
    },

    // --- Lifecycle ---
    /// The repository is in the process of closing.
    #[error("database is closing")]
    DatabaseClosing,

    /// `dbName` was not provided and could not be inferred.
    #[error("database name is undefined")]
    UndefinedDatabaseName,

    /// An operation requires an open database handle but none was given.
    #[error("no database is open")]
    UndefinedDb,

    // --- Queue ---
    /// A task was canceled (debounce collapse or queue stop).
    #[error("task canceled")]
    TaskCancel,

    /// A second `sync`/`push` task targeting the same remote was skipped.
    #[error("consecutive sync/push to `{remote}` skipped")]
    ConsecutiveSyncSkipped {
        /// The remote that already had a pending task.
        remote: String,
    },

    // --- Sync ---
    /// `trySync` found no common ancestor between local and remote.
    #[error("no merge base found between local and remote")]
    NoMergeBaseFound,

    /// A push was refused because the remote has commits not yet fetched.
    #[error("cannot push: unfetched commit exists on `{remote}`")]
    CannotPushBecauseUnfetchedCommitExists {
        /// The remote that refused the push.
        remote: String,
    },

    /// A sync operation was requested without a configured remote/session.
    #[error("sync is not configured")]
    UndefinedSync,

    // --- Underlying layers ---
    /// An error from the low-level git layer.
    #[error(transparent)]
    Git(#[from] gitddb_git::GitError),

    /// A JSON (de)serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A TOML configuration parse error.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// An I/O error not covered by a more specific variant above.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error represents a transient condition worth retrying
    /// (filesystem contention, network hiccups) as opposed to a durable one
    /// (validation failures, missing documents).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CannotCreateDirectory { .. }
                | Self::CannotCreateRepository { .. }
                | Self::CannotWriteData { .. }
                | Self::CannotPushBecauseUnfetchedCommitExists { .. }
                | Self::Io(_)
        )
    }
}
