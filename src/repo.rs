//! The repository handle: lifecycle (`open`/`close`/`destroy`) and the CRUD
//! engine that drives the task queue against the underlying git repository.
//!
//! The git handle is `Rc<dyn GitRepo>`, not `Arc`/`Mutex`: the queue is a
//! single-threaded cooperative executor (§4.3), and `GitRepo`'s methods are
//! all `&self`, so no interior mutability beyond what the queue itself
//! already provides is needed here.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use gitddb_git::{EntryMode, GitOid, GitRepo, GixRepo, RefName, TreeEdit};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::config::{self, InsertOrUpdate, PutOptions, RepositoryOptions, Serialize as SerializeFormat};
use crate::document::{self, Document};
use crate::error::Error;
use crate::id::IdGenerator;
use crate::queue::TaskQueue;
use crate::retry::with_retry;
use crate::stats::{CrudResult, TaskResult};
use crate::task::{Task, TaskLabel};
use crate::validator;

const CREATOR_NAME: &str = "gitddb";
const CURRENT_VERSION: &str = "1.0.0";
const INFO_PATH: &str = ".gitddb/info.json";

/// Directory-creation, repository init, and the put worker each retry up to
/// three additional times on a transient filesystem error (§4.4, §4.7).
const RETRY_ATTEMPTS: u32 = 4;
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// The persisted shape of `.gitddb/info.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoFile {
    db_id: String,
    creator: String,
    version: String,
    serialize: SerializeFormat,
}

/// Classification of `.gitddb/info.json` produced by `Repository::open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// The database's monotonic id.
    pub db_id: String,
    /// Who wrote the info file (`"gitddb"`, or `"unknown"` if absent).
    pub creator: String,
    /// The info file's recorded version string (empty if absent).
    pub version: String,
    /// Whether this `open` call created the repository.
    pub is_new: bool,
    /// Whether an info file written by this crate was found.
    pub is_created_by_gitddb: bool,
    /// Whether the info file's version matches `CURRENT_VERSION`.
    pub is_valid_version: bool,
    /// The document serialization format in effect.
    pub serialize: SerializeFormat,
}

/// The repository handle: owns the git backend, the task queue, and the
/// monotonic id generator, and exposes the CRUD engine and lifecycle.
///
/// Cheap to clone: every field is either `Rc`-shared or small owned data, so
/// a [`crate::Collection`] can hold its own copy alongside a path prefix
/// rather than borrowing (composition, per §9 "inheritance → composition").
#[derive(Clone)]
pub struct Repository {
    git: Rc<dyn GitRepo>,
    queue: Rc<TaskQueue<TaskResult>>,
    #[allow(dead_code)]
    id_gen: Rc<IdGenerator>,
    working_dir: PathBuf,
    ext: String,
    debounce_time: Option<i64>,
    info: RepositoryInfo,
    /// Sync sessions this repository owns, keyed by remote URL (§5
    /// "a sync session is owned by the repository and referenced by
    /// external event subscribers"). Shared across clones, unlike the other
    /// plain fields, so every handle to the same repository sees the same
    /// live sessions.
    sync_sessions: Rc<RefCell<HashMap<String, Rc<crate::sync::SyncSession>>>>,
}

impl Repository {
    /// Open (creating if allowed and absent) the repository described by
    /// `options`.
    ///
    /// # Errors
    /// Returns [`Error::RepositoryNotFound`] if no repository exists and
    /// creation is disallowed, [`Error::CannotCreateRepository`] /
    /// [`Error::CannotOpenRepository`] on backend failure, or a validation
    /// error if `options` itself is malformed.
    pub fn open(options: RepositoryOptions) -> Result<Self, Error> {
        validator::validate_db_name(&options.db_name)?;
        validator::validate_local_dir(&options.local_dir.to_string_lossy())?;

        if matches!(options.serialize, SerializeFormat::FrontMatter) {
            return Err(Error::InvalidJsonFileExtension {
                ext: options.serialize.extension().to_owned(),
            });
        }

        let working_dir = options.working_dir();
        let working_dir_len = working_dir.to_string_lossy().len();
        let max_working_dir = validator::max_working_directory_length();
        if working_dir_len > max_working_dir {
            return Err(Error::InvalidWorkingDirectoryPathLength {
                len: working_dir_len,
                max: max_working_dir,
            });
        }

        let id_gen = Rc::new(config::new_id_generator());
        let has_git_dir = working_dir.join(".git").exists();

        let (git, info): (Rc<dyn GitRepo>, RepositoryInfo) = if has_git_dir {
            let opened = GixRepo::open_at(&working_dir).map_err(|e| Error::CannotOpenRepository {
                path: working_dir.clone(),
                reason: e.to_string(),
            })?;
            let git: Rc<dyn GitRepo> = Rc::new(opened);
            match git.rev_parse_opt("HEAD")? {
                Some(head) => {
                    let info = read_or_repair_info(git.as_ref(), head, &id_gen, options.serialize)?;
                    (git, info)
                }
                None if options.create_if_not_exists => {
                    init_info_commit(git.as_ref(), &working_dir, &options, &id_gen)?
                }
                None => {
                    return Err(Error::CannotOpenRepository {
                        path: working_dir.clone(),
                        reason: "repository has no commits".to_owned(),
                    });
                }
            }
        } else {
            if !options.create_if_not_exists {
                return Err(Error::RepositoryNotFound { path: working_dir.clone() });
            }
            with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || {
                std::fs::create_dir_all(&working_dir).map_err(|source| Error::CannotCreateDirectory {
                    path: working_dir.clone(),
                    source,
                })
            })?;
            let opened = with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || {
                GixRepo::init(&working_dir).map_err(|e| Error::CannotCreateRepository {
                    path: working_dir.clone(),
                    reason: e.to_string(),
                })
            })?;
            let git: Rc<dyn GitRepo> = Rc::new(opened);
            init_info_commit(git.as_ref(), &working_dir, &options, &id_gen)?
        };

        let queue = Rc::new(TaskQueue::new(Rc::clone(&id_gen)));
        let ext = info.serialize.extension().to_owned();

        tracing::info!(
            target: "gitddb::repo",
            db_id = %info.db_id,
            is_new = info.is_new,
            path = %working_dir.display(),
            "repository opened",
        );

        Ok(Self {
            git,
            queue,
            id_gen,
            working_dir,
            ext,
            debounce_time: options.debounce_time,
            info,
            sync_sessions: Rc::new(RefCell::new(HashMap::new())),
        })
    }

    /// The classification of `.gitddb/info.json` produced at `open` time.
    #[must_use]
    pub const fn info(&self) -> &RepositoryInfo {
        &self.info
    }

    /// The repository's working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Running per-label completion/cancellation counters.
    #[must_use]
    pub fn current_statistics(&self) -> crate::stats::QueueStatistics {
        self.queue.current_statistics()
    }

    /// The shared git handle, for the sync engine.
    pub(crate) fn git_handle(&self) -> &Rc<dyn GitRepo> {
        &self.git
    }

    /// The shared task queue, for the sync engine.
    pub(crate) fn queue_handle(&self) -> &Rc<TaskQueue<TaskResult>> {
        &self.queue
    }

    /// Wait for outstanding tasks to finish (up to `timeout`), then stop the
    /// queue. Returns `true` if the wait timed out.
    pub fn close(&self, timeout: Duration) -> bool {
        let timed_out = self.queue.wait_completion(timeout);
        self.queue.stop();
        tracing::info!(target: "gitddb::repo", db_id = %self.info.db_id, timed_out, "repository closed");
        timed_out
    }

    /// Close the repository, then recursively delete its working directory.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the directory cannot be removed.
    pub fn destroy(self, timeout: Duration) -> Result<(), Error> {
        self.close(timeout);
        std::fs::remove_dir_all(&self.working_dir).map_err(Error::Io)
    }

    // --- CRUD: put family ---

    /// Upsert a document, generating an id if `value` carries none.
    pub fn put(&self, value: Value) -> Result<CrudResult, Error> {
        self.put_in("", None, value, PutOptions::default(), None)
    }

    /// Upsert a document under an explicit id, overriding any `_id` in `value`.
    pub fn put_with_id(&self, id: impl Into<String>, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        let forced = opts.insert_or_update;
        self.put_in("", Some(id.into()), value, opts, forced)
    }

    /// Create a document, failing with [`Error::SameIdExists`] if it already exists.
    pub fn insert(&self, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.put_in("", None, value, opts, Some(InsertOrUpdate::Insert))
    }

    /// Like [`Self::insert`], under an explicit id.
    pub fn insert_with_id(&self, id: impl Into<String>, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.put_in("", Some(id.into()), value, opts, Some(InsertOrUpdate::Insert))
    }

    /// Modify a document, failing with [`Error::DocumentNotFound`] if it does not exist.
    pub fn update(&self, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.put_in("", None, value, opts, Some(InsertOrUpdate::Update))
    }

    /// Like [`Self::update`], under an explicit id.
    pub fn update_with_id(&self, id: impl Into<String>, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.put_in("", Some(id.into()), value, opts, Some(InsertOrUpdate::Update))
    }

    /// Remove a document by id.
    pub fn delete(&self, id: impl Into<String>, opts: PutOptions) -> Result<CrudResult, Error> {
        self.delete_in("", id.into(), opts)
    }

    /// Remove a document, reading its id from `value`'s `_id` field.
    pub fn delete_doc(&self, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        let id = value
            .get("_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or(Error::UndefinedDocumentId)?;
        self.delete_in("", id, opts)
    }

    /// Read a document at current HEAD. Returns `None` rather than an error
    /// if no such document exists.
    pub fn get(&self, id: &str) -> Result<Option<Document>, Error> {
        self.get_in("", id)
    }

    /// List the non-deleted documents directly under `collection_path` at HEAD.
    pub fn all_docs(&self, collection_path: &str) -> Result<Vec<Document>, Error> {
        self.all_docs_in(collection_path)
    }

    /// List collection paths directly under `root_path`, excluding `.gitddb`.
    pub fn get_collections(&self, root_path: &str) -> Result<Vec<String>, Error> {
        let normalized = validator::normalize_collection_path(root_path);
        let Some(head) = self.git.rev_parse_opt("HEAD")? else {
            return Ok(Vec::new());
        };
        let commit_info = self.git.read_commit(head)?;
        let Some(dir_tree) = descend_tree(self.git.as_ref(), commit_info.tree_oid, &normalized)? else {
            return Ok(Vec::new());
        };
        let entries = self.git.read_tree(dir_tree)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.mode == EntryMode::Tree && e.name != ".gitddb")
            .map(|e| format!("{normalized}{}/", e.name))
            .collect())
    }

    /// A path-prefixed view over this repository. Collections may nest
    /// (`"col01/col02"`); normalization happens once here, at construction.
    #[must_use]
    pub fn collection(&self, path: &str) -> crate::collection::Collection {
        crate::collection::Collection::new(self.clone(), path)
    }

    /// The sync session for `options.remote_url`, creating it on first call.
    /// Later calls for the same remote return the same session (so two
    /// callers subscribing to its events see the same stream); `options`
    /// passed on a later call for an already-open remote is ignored.
    #[must_use]
    pub fn sync(&self, options: crate::config::SyncOptions) -> Rc<crate::sync::SyncSession> {
        let mut sessions = self.sync_sessions.borrow_mut();
        Rc::clone(
            sessions
                .entry(options.remote_url.clone())
                .or_insert_with(|| Rc::new(crate::sync::SyncSession::new(self.clone(), options))),
        )
    }

    /// Shared implementation for the `put`/`insert`/`update` family, also
    /// used by the collection view with a non-empty `collection_path`.
    pub(crate) fn put_in(
        &self,
        collection_path: &str,
        explicit_id: Option<String>,
        value: Value,
        opts: PutOptions,
        forced: Option<InsertOrUpdate>,
    ) -> Result<CrudResult, Error> {
        let short_id = match resolve_short_id(explicit_id, &value) {
            Some(id) => id,
            None if forced != Some(InsertOrUpdate::Update) => self.id_gen.next(),
            None => return Err(Error::UndefinedDocumentId),
        };

        let max_id_len = validator::max_id_length(self.working_dir.to_string_lossy().len(), &self.ext);
        validator::validate_collection_path(collection_path, max_id_len)?;
        validator::validate_id(&short_id, max_id_len)?;
        let doc = Document::from_json_value_with_id(short_id.clone(), value)?;
        validator::validate_document(&doc, max_id_len)?;

        let full_id = format!("{collection_path}{short_id}");
        let filename = format!("{collection_path}{}", document::fat_doc_name(&short_id, &self.ext));
        let bytes = canonical::to_canonical_bytes(&doc, &full_id)?;

        let label = match forced {
            Some(InsertOrUpdate::Insert) => TaskLabel::Insert,
            Some(InsertOrUpdate::Update) => TaskLabel::Update,
            None => TaskLabel::Put,
        };

        let git = Rc::clone(&self.git);
        let working_dir = self.working_dir.clone();
        let commit_message = opts.commit_message.clone();
        let filename_for_task = filename.clone();
        let short_id_for_task = short_id.clone();
        let task_id = opts.task_id.clone().unwrap_or_else(|| self.queue.new_task_id());
        let debounce_time = opts.debounce_time.or(self.debounce_time);
        let enqueue_callback = opts
            .enqueue_callback
            .map(|cb| -> Box<dyn FnOnce()> { Box::new(move || (cb.as_ref())()) });

        let task = Task {
            label,
            task_id,
            target_id: Some(full_id.clone()),
            collection_path: collection_path.to_owned(),
            short_name: Some(full_id),
            sync_remote_name: None,
            enqueue_time: 0,
            debounce_time,
            func: Some(Box::new(move || {
                run_put(
                    git.as_ref(),
                    &working_dir,
                    &filename_for_task,
                    &bytes,
                    forced,
                    commit_message.as_deref(),
                    &short_id_for_task,
                )
            })),
            enqueue_callback,
            completion: None,
        };

        match self.queue.push_and_wait(task)? {
            TaskResult::Crud(result) => Ok(result),
            TaskResult::Sync(_) => unreachable!("a CRUD task always produces a CrudResult"),
        }
    }

    /// Shared implementation for `delete`, also used by the collection view.
    pub(crate) fn delete_in(&self, collection_path: &str, short_id: String, opts: PutOptions) -> Result<CrudResult, Error> {
        if short_id.is_empty() {
            return Err(Error::UndefinedDocumentId);
        }
        let max_id_len = validator::max_id_length(self.working_dir.to_string_lossy().len(), &self.ext);
        validator::validate_id(&short_id, max_id_len)?;

        let full_id = format!("{collection_path}{short_id}");
        let filename = format!("{collection_path}{}", document::fat_doc_name(&short_id, &self.ext));

        let git = Rc::clone(&self.git);
        let working_dir = self.working_dir.clone();
        let commit_message = opts.commit_message.clone();
        let filename_for_task = filename.clone();
        let short_id_for_task = short_id.clone();
        let task_id = opts.task_id.clone().unwrap_or_else(|| self.queue.new_task_id());
        let enqueue_callback = opts
            .enqueue_callback
            .map(|cb| -> Box<dyn FnOnce()> { Box::new(move || (cb.as_ref())()) });

        let task = Task {
            label: TaskLabel::Delete,
            task_id,
            target_id: Some(full_id.clone()),
            collection_path: collection_path.to_owned(),
            short_name: Some(full_id),
            sync_remote_name: None,
            enqueue_time: 0,
            debounce_time: opts.debounce_time,
            func: Some(Box::new(move || {
                run_delete(git.as_ref(), &working_dir, &filename_for_task, commit_message.as_deref(), &short_id_for_task)
            })),
            enqueue_callback,
            completion: None,
        };

        match self.queue.push_and_wait(task)? {
            TaskResult::Crud(result) => Ok(result),
            TaskResult::Sync(_) => unreachable!("a CRUD task always produces a CrudResult"),
        }
    }

    pub(crate) fn get_in(&self, collection_path: &str, short_id: &str) -> Result<Option<Document>, Error> {
        let filename = format!("{collection_path}{}", document::fat_doc_name(short_id, &self.ext));
        let Some(head) = self.git.rev_parse_opt("HEAD")? else {
            return Ok(None);
        };
        let commit_info = self.git.read_commit(head)?;
        let Some(blob_oid) = find_blob_by_path(self.git.as_ref(), commit_info.tree_oid, &filename)? else {
            return Ok(None);
        };
        let bytes = self.git.read_blob(blob_oid)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let mut doc = Document::from_json_value(value)?;
        if let Some(stripped) = doc.id.strip_prefix(collection_path) {
            doc.id = stripped.to_owned();
        }
        Ok(Some(doc))
    }

    pub(crate) fn all_docs_in(&self, collection_path: &str) -> Result<Vec<Document>, Error> {
        let normalized = validator::normalize_collection_path(collection_path);
        let Some(head) = self.git.rev_parse_opt("HEAD")? else {
            return Ok(Vec::new());
        };
        let commit_info = self.git.read_commit(head)?;
        let Some(dir_tree) = descend_tree(self.git.as_ref(), commit_info.tree_oid, &normalized)? else {
            return Ok(Vec::new());
        };
        let entries = self.git.read_tree(dir_tree)?;
        let mut docs = Vec::new();
        for entry in entries {
            if entry.name == ".gitddb" || !matches!(entry.mode, EntryMode::Blob | EntryMode::BlobExecutable) {
                continue;
            }
            if !entry.name.ends_with(&self.ext) {
                continue;
            }
            let bytes = self.git.read_blob(entry.oid)?;
            let value: Value = serde_json::from_slice(&bytes)?;
            let mut doc = Document::from_json_value(value)?;
            if let Some(stripped) = doc.id.strip_prefix(&normalized) {
                doc.id = stripped.to_owned();
            }
            docs.push(doc);
        }
        Ok(docs)
    }
}

fn resolve_short_id(explicit: Option<String>, value: &Value) -> Option<String> {
    if let Some(id) = explicit {
        if !id.is_empty() {
            return Some(id);
        }
    }
    match value.get("_id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn short_oid(oid: GitOid) -> String {
    oid.to_string()[..7].to_owned()
}

/// Initialize a freshly-created repository: configure a commit identity
/// (a bare `gix::init` leaves none), write `.gitddb/info.json`, and make the
/// first (parentless) commit.
///
/// `write_config` shells out to the git CLI, so the commit identity it sets
/// is invisible to `git`'s already-loaded config snapshot; the handle is
/// reopened afterward so `create_commit`'s `author()`/`committer()` lookups
/// see it.
fn init_info_commit(
    git: &dyn GitRepo,
    working_dir: &Path,
    options: &RepositoryOptions,
    id_gen: &IdGenerator,
) -> Result<(Rc<dyn GitRepo>, RepositoryInfo), Error> {
    let to_create_err = |e: gitddb_git::GitError| Error::CannotCreateRepository {
        path: working_dir.to_path_buf(),
        reason: e.to_string(),
    };

    git.write_config("user.name", CREATOR_NAME).map_err(to_create_err)?;
    git.write_config("user.email", "gitddb@localhost").map_err(to_create_err)?;

    let git: Rc<dyn GitRepo> = Rc::new(GixRepo::open_at(working_dir).map_err(to_create_err)?);

    let db_id = id_gen.next();
    let info = InfoFile {
        db_id: db_id.clone(),
        creator: CREATOR_NAME.to_owned(),
        version: CURRENT_VERSION.to_owned(),
        serialize: options.serialize,
    };
    let mut bytes = serde_json::to_vec_pretty(&info)?;
    bytes.push(b'\n');

    let blob_oid = git.write_blob(&bytes).map_err(to_create_err)?;
    let empty_tree = git.write_tree(&[]).map_err(to_create_err)?;
    let tree = git
        .edit_tree(
            empty_tree,
            &[TreeEdit::Upsert {
                path: INFO_PATH.to_owned(),
                mode: EntryMode::Blob,
                oid: blob_oid,
            }],
        )
        .map_err(to_create_err)?;

    let head_ref = RefName::new("HEAD").expect("HEAD is a well-known ref name");
    let commit = git
        .create_commit(tree, &[], "gitddb: init", Some(&head_ref))
        .map_err(to_create_err)?;
    git.checkout_tree(commit, working_dir).map_err(to_create_err)?;

    Ok((
        git,
        RepositoryInfo {
            db_id,
            creator: CREATOR_NAME.to_owned(),
            version: CURRENT_VERSION.to_owned(),
            is_new: true,
            is_created_by_gitddb: true,
            is_valid_version: true,
            serialize: options.serialize,
        },
    ))
}

/// Read and classify an existing repository's `.gitddb/info.json`, repairing
/// a missing/empty `dbId` in memory without creating a new commit.
fn read_or_repair_info(
    git: &dyn GitRepo,
    head: GitOid,
    id_gen: &IdGenerator,
    default_serialize: SerializeFormat,
) -> Result<RepositoryInfo, Error> {
    let commit_info = git.read_commit(head)?;
    match find_blob_by_path(git, commit_info.tree_oid, INFO_PATH)? {
        Some(blob_oid) => {
            let bytes = git.read_blob(blob_oid)?;
            let parsed: InfoFile = serde_json::from_slice(&bytes)?;
            let db_id = if parsed.db_id.is_empty() { id_gen.next() } else { parsed.db_id };
            let is_valid_version = parsed.version == CURRENT_VERSION;
            Ok(RepositoryInfo {
                db_id,
                creator: parsed.creator,
                version: parsed.version,
                is_new: false,
                is_created_by_gitddb: true,
                is_valid_version,
                serialize: parsed.serialize,
            })
        }
        None => Ok(RepositoryInfo {
            db_id: id_gen.next(),
            creator: "unknown".to_owned(),
            version: String::new(),
            is_new: false,
            is_created_by_gitddb: false,
            is_valid_version: false,
            serialize: default_serialize,
        }),
    }
}

/// Walk `path`'s directory segments from `root`, returning the tree at that
/// subpath (or `root` itself for an empty path), or `None` if any segment is
/// missing or is not itself a directory.
fn descend_tree(git: &dyn GitRepo, root: GitOid, path: &str) -> Result<Option<GitOid>, Error> {
    let mut current = root;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let entries = git.read_tree(current)?;
        let Some(entry) = entries.iter().find(|e| e.name == segment && e.mode == EntryMode::Tree) else {
            return Ok(None);
        };
        current = entry.oid;
    }
    Ok(Some(current))
}

fn find_blob_in_tree(git: &dyn GitRepo, tree: GitOid, name: &str) -> Result<Option<GitOid>, Error> {
    let entries = git.read_tree(tree)?;
    Ok(entries
        .into_iter()
        .find(|e| e.name == name && matches!(e.mode, EntryMode::Blob | EntryMode::BlobExecutable))
        .map(|e| e.oid))
}

/// Look up a (possibly nested) path's blob oid under `root`, or `None` if any
/// directory component is missing or the final component is not a blob.
fn find_blob_by_path(git: &dyn GitRepo, root: GitOid, path: &str) -> Result<Option<GitOid>, Error> {
    match path.rsplit_once('/') {
        Some((dir, name)) => match descend_tree(git, root, dir)? {
            Some(dir_tree) => find_blob_in_tree(git, dir_tree, name),
            None => Ok(None),
        },
        None => find_blob_in_tree(git, root, path),
    }
}

/// The put worker (§4.4): write the blob, splice it into HEAD's tree, commit,
/// and materialize the result into the working directory. Existence of the
/// prior entry is read straight from the HEAD tree rather than the index —
/// the queue is the working directory's only writer, so the two never
/// diverge — and `checkout_tree` both stages the index and updates the
/// working directory in one step, removing anything now stale.
fn run_put(
    git: &dyn GitRepo,
    working_dir: &Path,
    filename: &str,
    bytes: &[u8],
    forced: Option<InsertOrUpdate>,
    commit_message: Option<&str>,
    short_id: &str,
) -> Result<TaskResult, Error> {
    with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || {
        let head = git.rev_parse("HEAD")?;
        let head_commit = git.read_commit(head)?;
        let head_tree = head_commit.tree_oid;

        let existed_before = find_blob_by_path(git, head_tree, filename)?.is_some();
        match forced {
            Some(InsertOrUpdate::Insert) if existed_before => {
                return Err(Error::SameIdExists { id: short_id.to_owned() });
            }
            Some(InsertOrUpdate::Update) if !existed_before => {
                return Err(Error::DocumentNotFound { id: short_id.to_owned() });
            }
            _ => {}
        }

        let to_write_err = |e: gitddb_git::GitError| Error::CannotWriteData {
            path: filename.to_owned(),
            reason: e.to_string(),
        };

        let blob_oid = git.write_blob(bytes).map_err(to_write_err)?;
        let new_tree = git
            .edit_tree(
                head_tree,
                &[TreeEdit::Upsert {
                    path: filename.to_owned(),
                    mode: EntryMode::Blob,
                    oid: blob_oid,
                }],
            )
            .map_err(to_write_err)?;

        let effective_label = if existed_before { "update" } else { "insert" };
        let message = commit_message
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{effective_label}: {filename}({})", short_oid(blob_oid)));

        let head_ref = RefName::new("HEAD").expect("HEAD is a well-known ref name");
        let commit = git
            .create_commit(new_tree, &[head], &message, Some(&head_ref))
            .map_err(to_write_err)?;
        git.checkout_tree(commit, working_dir).map_err(to_write_err)?;

        Ok(TaskResult::Crud(CrudResult {
            id: short_id.to_owned(),
            file_oid: Some(blob_oid),
            commit,
        }))
    })
}

/// The delete worker (§4.4). Pruning now-empty ancestor directories (§8
/// invariant 5) is already handled by `checkout_tree`, which removes any
/// working-tree entry absent from the target tree, directories included.
fn run_delete(
    git: &dyn GitRepo,
    working_dir: &Path,
    filename: &str,
    commit_message: Option<&str>,
    short_id: &str,
) -> Result<TaskResult, Error> {
    with_retry(RETRY_ATTEMPTS, RETRY_DELAY, || {
        let head = git.rev_parse("HEAD")?;
        let head_commit = git.read_commit(head)?;
        let head_tree = head_commit.tree_oid;

        let Some(blob_oid) = find_blob_by_path(git, head_tree, filename)? else {
            return Err(Error::DocumentNotFound { id: short_id.to_owned() });
        };

        let to_delete_err = |e: gitddb_git::GitError| Error::CannotDeleteData {
            path: filename.to_owned(),
            reason: e.to_string(),
        };

        let new_tree = git
            .edit_tree(head_tree, &[TreeEdit::Remove { path: filename.to_owned() }])
            .map_err(to_delete_err)?;

        let message = commit_message
            .map(str::to_owned)
            .unwrap_or_else(|| format!("delete: {filename}({})", short_oid(blob_oid)));

        let head_ref = RefName::new("HEAD").expect("HEAD is a well-known ref name");
        let commit = git
            .create_commit(new_tree, &[head], &message, Some(&head_ref))
            .map_err(to_delete_err)?;
        git.checkout_tree(commit, working_dir).map_err(to_delete_err)?;

        Ok(TaskResult::Crud(CrudResult {
            id: short_id.to_owned(),
            file_oid: None,
            commit,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_db(dir: &std::path::Path) -> Repository {
        let mut opts = RepositoryOptions::new("testdb");
        opts.local_dir = dir.to_path_buf();
        Repository::open(opts).unwrap()
    }

    #[test]
    fn sync_returns_the_same_session_for_the_same_remote() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let a = repo.sync(crate::config::SyncOptions::new("https://example.invalid/a.git"));
        let b = repo.sync(crate::config::SyncOptions::new("https://example.invalid/a.git"));
        assert!(Rc::ptr_eq(&a, &b));
        let c = repo.sync(crate::config::SyncOptions::new("https://example.invalid/b.git"));
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn open_creates_repository_and_info_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        assert!(repo.info().is_new);
        assert!(repo.info().is_created_by_gitddb);
        assert!(repo.info().is_valid_version);
        assert_eq!(repo.info().db_id.len(), 26);
        assert!(repo.working_dir().join(".gitddb/info.json").is_file());
    }

    #[test]
    fn reopen_reads_existing_info() {
        let dir = tempfile::tempdir().unwrap();
        let db_id = open_db(dir.path()).info().db_id.clone();
        let repo2 = open_db(dir.path());
        assert!(!repo2.info().is_new);
        assert_eq!(repo2.info().db_id, db_id);
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let result = repo.insert(json!({"_id": "1", "name": "a"}), PutOptions::default()).unwrap();
        assert_eq!(result.id, "1");
        let doc = repo.get("1").unwrap().unwrap();
        assert_eq!(doc.to_json_value(), json!({"_id": "1", "name": "a"}));
    }

    #[test]
    fn insert_same_id_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        repo.insert(json!({"_id": "1", "name": "a"}), PutOptions::default()).unwrap();
        let err = repo.insert(json!({"_id": "1", "name": "b"}), PutOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SameIdExists { .. }));
    }

    #[test]
    fn update_missing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let err = repo.update(json!({"_id": "missing", "name": "a"}), PutOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound { .. }));
    }

    #[test]
    fn put_upserts_and_advances_commit_chain() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let r1 = repo.put(json!({"_id": "1", "name": "a"})).unwrap();
        let r2 = repo.put(json!({"_id": "1", "name": "b"})).unwrap();
        assert_ne!(r1.commit, r2.commit);
        let doc = repo.get("1").unwrap().unwrap();
        assert_eq!(doc.body.get("name").unwrap(), "b");
    }

    #[test]
    fn delete_then_insert_succeeds_and_prunes_directories() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        repo.put_with_id("col/1", json!({"name": "a"}), PutOptions::default()).unwrap();
        assert!(repo.working_dir().join("col").is_dir());
        repo.delete("col/1", PutOptions::default()).unwrap();
        assert!(!repo.working_dir().join("col").exists());
        assert!(repo.get("col/1").unwrap().is_none());
        repo.insert_with_id("col/1", json!({"name": "b"}), PutOptions::default()).unwrap();
        assert!(repo.get("col/1").unwrap().is_some());
    }

    #[test]
    fn delete_missing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let err = repo.delete("missing", PutOptions::default()).unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound { .. }));
    }

    #[test]
    fn get_missing_document_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        assert!(repo.get("missing").unwrap().is_none());
    }

    #[test]
    fn all_docs_lists_non_deleted_documents_at_a_path() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        repo.insert(json!({"_id": "a", "n": 1}), PutOptions::default()).unwrap();
        repo.insert(json!({"_id": "b", "n": 2}), PutOptions::default()).unwrap();
        let mut ids: Vec<String> = repo.all_docs("").unwrap().into_iter().map(|d| d.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn collection_prefixed_put_strips_prefix_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        repo.put_in("users/", Some("1".to_owned()), json!({"name": "x"}), PutOptions::default(), None)
            .unwrap();
        let doc = repo.get_in("users/", "1").unwrap().unwrap();
        assert_eq!(doc.id, "1");
        assert_eq!(doc.body.get("name").unwrap(), "x");
        let raw = std::fs::read_to_string(repo.working_dir().join("users/1.json")).unwrap();
        assert!(raw.contains("\"_id\": \"users/1\""));
    }

    #[test]
    fn get_collections_lists_directories_excluding_gitddb() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        repo.put_in("users/", Some("1".to_owned()), json!({"name": "x"}), PutOptions::default(), None)
            .unwrap();
        let collections = repo.get_collections("").unwrap();
        assert_eq!(collections, vec!["users/".to_owned()]);
    }

    #[test]
    fn commit_messages_follow_the_template() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let inserted = repo.insert(json!({"_id": "1", "name": "a"}), PutOptions::default()).unwrap();
        let info = repo.git.read_commit(inserted.commit).unwrap();
        assert!(info.message.starts_with("insert: 1.json("));
        let updated = repo.update(json!({"_id": "1", "name": "b"}), PutOptions::default()).unwrap();
        let info = repo.git.read_commit(updated.commit).unwrap();
        assert!(info.message.starts_with("update: 1.json("));
    }
}
