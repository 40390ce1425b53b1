//! Path-prefixed view over a [`Repository`] (§4.5).
//!
//! A collection holds a repository and a normalized path prefix rather than
//! inheriting from it (§9 "inheritance of repository into collection →
//! composition"): every call forwards to the repository's CRUD engine with
//! `shortId` replaced by `<collectionPath><shortId>`, and every return value
//! has the prefix stripped back off.

use serde_json::Value;

use crate::config::{InsertOrUpdate, PutOptions};
use crate::document::Document;
use crate::error::Error;
use crate::repo::Repository;
use crate::stats::CrudResult;
use crate::validator;

/// A path-prefixed view over a [`Repository`]. See the module docs.
pub struct Collection {
    repo: Repository,
    path: String,
}

impl Collection {
    pub(crate) fn new(repo: Repository, path: &str) -> Self {
        Self {
            repo,
            path: validator::normalize_collection_path(path),
        }
    }

    /// The normalized collection path (empty, or ending in `/`).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Upsert a document, generating an id if `value` carries none.
    pub fn put(&self, value: Value) -> Result<CrudResult, Error> {
        self.repo.put_in(&self.path, None, value, PutOptions::default(), None)
    }

    /// Upsert a document under an explicit id, overriding any `_id` in `value`.
    pub fn put_with_id(&self, id: impl Into<String>, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        let forced = opts.insert_or_update;
        self.repo.put_in(&self.path, Some(id.into()), value, opts, forced)
    }

    /// Create a document, failing with [`Error::SameIdExists`] if it already exists.
    pub fn insert(&self, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.repo.put_in(&self.path, None, value, opts, Some(InsertOrUpdate::Insert))
    }

    /// Like [`Self::insert`], under an explicit id.
    pub fn insert_with_id(&self, id: impl Into<String>, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.repo
            .put_in(&self.path, Some(id.into()), value, opts, Some(InsertOrUpdate::Insert))
    }

    /// Modify a document, failing with [`Error::DocumentNotFound`] if it does not exist.
    pub fn update(&self, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.repo.put_in(&self.path, None, value, opts, Some(InsertOrUpdate::Update))
    }

    /// Like [`Self::update`], under an explicit id.
    pub fn update_with_id(&self, id: impl Into<String>, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        self.repo
            .put_in(&self.path, Some(id.into()), value, opts, Some(InsertOrUpdate::Update))
    }

    /// Remove a document by id.
    pub fn delete(&self, id: impl Into<String>, opts: PutOptions) -> Result<CrudResult, Error> {
        self.repo.delete_in(&self.path, id.into(), opts)
    }

    /// Remove a document, reading its id from `value`'s `_id` field.
    pub fn delete_doc(&self, value: Value, opts: PutOptions) -> Result<CrudResult, Error> {
        let id = value
            .get("_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .ok_or(Error::UndefinedDocumentId)?;
        self.repo.delete_in(&self.path, id, opts)
    }

    /// Read a document at current HEAD. Returns `None` rather than an error
    /// if no such document exists.
    pub fn get(&self, id: &str) -> Result<Option<Document>, Error> {
        self.repo.get_in(&self.path, id)
    }

    /// List the non-deleted documents directly under this collection at HEAD.
    pub fn all_docs(&self) -> Result<Vec<Document>, Error> {
        self.repo.all_docs_in(&self.path)
    }

    /// Sub-collection nested under this one.
    #[must_use]
    pub fn collection(&self, path: &str) -> Self {
        Self::new(self.repo.clone(), &format!("{}{path}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryOptions;
    use serde_json::json;

    fn open_db(dir: &std::path::Path) -> Repository {
        let mut opts = RepositoryOptions::new("testdb");
        opts.local_dir = dir.to_path_buf();
        Repository::open(opts).unwrap()
    }

    #[test]
    fn collection_roundtrip_strips_and_applies_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let users = repo.collection("users");
        users.put_with_id("1", json!({"name": "x"}), PutOptions::default()).unwrap();

        let doc = users.get("1").unwrap().unwrap();
        assert_eq!(doc.id, "1");

        let raw = std::fs::read_to_string(repo.working_dir().join("users/1.json")).unwrap();
        assert!(raw.contains("\"_id\": \"users/1\""));

        assert!(repo.get("users/1").unwrap().is_some());
    }

    #[test]
    fn nested_collections_compose_paths() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let col = repo.collection("col01").collection("col02");
        assert_eq!(col.path(), "col01/col02/");
        col.put_with_id("1", json!({"name": "x"}), PutOptions::default()).unwrap();
        assert!(repo.get("col01/col02/1").unwrap().is_some());
    }

    #[test]
    fn insert_same_id_in_collection_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let col = repo.collection("c");
        col.insert_with_id("1", json!({"a": 1}), PutOptions::default()).unwrap();
        let err = col.insert_with_id("1", json!({"a": 2}), PutOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SameIdExists { .. }));
    }

    #[test]
    fn all_docs_scoped_to_collection() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        let users = repo.collection("users");
        users.put_with_id("1", json!({"n": 1}), PutOptions::default()).unwrap();
        users.put_with_id("2", json!({"n": 2}), PutOptions::default()).unwrap();
        repo.put_with_id("top", json!({"n": 0}), PutOptions::default()).unwrap();

        let mut ids: Vec<String> = users.all_docs().unwrap().into_iter().map(|d| d.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["1".to_owned(), "2".to_owned()]);
    }

    #[test]
    fn get_collections_from_repository_lists_user_collection() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_db(dir.path());
        repo.collection("users")
            .put_with_id("1", json!({"n": 1}), PutOptions::default())
            .unwrap();
        assert_eq!(repo.get_collections("").unwrap(), vec!["users/".to_owned()]);
    }
}
