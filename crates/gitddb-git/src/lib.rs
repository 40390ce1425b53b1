//! Git object I/O abstraction layer for gitddb.
//!
//! This crate defines the [`GitRepo`] trait — the single interface through
//! which the `gitddb` crate interacts with git. `gitddb` should never import
//! gix (or any other git library) directly; instead, it depends on
//! `gitddb-git` and programs against the trait.
//!
//! # Crate layout
//!
//! - [`repo`] — the [`GitRepo`] trait definition.
//! - [`types`] — value types used in trait signatures ([`GitOid`], [`RefName`],
//!   [`TreeEntry`], [`DiffEntry`], etc.).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.
//! - [`gix_repo`] — the [`GixRepo`] implementation, backed by [gix].
//!
//! [gix]: https://github.com/GitoxideLabs/gitoxide

mod checkout_impl;
mod config_impl;
mod diff_impl;
pub mod error;
mod fetch_impl;
mod gix_repo;
mod index_impl;
mod objects_impl;
mod push_impl;
mod refs_impl;
pub mod repo;
pub mod types;

// Re-export the main trait and commonly used types at the crate root for
// ergonomic imports: `use gitddb_git::{GitRepo, GitOid, GitError};`
pub use error::GitError;
pub use gix_repo::GixRepo;
pub use repo::GitRepo;
pub use types::{
    ChangeType, CommitInfo, DiffEntry, EntryMode, GitOid, IndexEntry, OidParseError, RefEdit,
    RefName, RefNameError, TreeEdit, TreeEntry,
};
