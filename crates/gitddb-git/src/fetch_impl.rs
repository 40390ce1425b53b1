//! Fetch via git CLI fallback.
//!
//! Kept alongside push as a CLI subprocess: gix's network client stack is
//! heavier to wire up correctly (transport negotiation, auth) than shelling
//! out to the user's already-configured `git`.

use std::path::Path;
use std::process::Command;

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::GitOid;

pub fn fetch(repo: &GixRepo, remote: &str, branch: &str) -> Result<GitOid, GitError> {
    let dir = git_dir(repo)?;
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .arg("fetch")
        .arg(remote)
        .arg(branch)
        .output()?;

    if !output.status.success() {
        return Err(GitError::BackendError {
            message: format!(
                "git fetch {remote} {branch} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }

    crate::refs_impl::rev_parse(repo, "FETCH_HEAD")
}

fn git_dir(repo: &GixRepo) -> Result<&Path, GitError> {
    repo.workdir.as_deref().ok_or_else(|| GitError::BackendError {
        message: "fetch requires a repository with a working directory".to_owned(),
    })
}
