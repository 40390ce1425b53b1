//! Git config read/write.
//!
//! Reads go through gix's resolved config snapshot. Writes shell out to the
//! git CLI, which already knows how to find and lock the right config file.

use std::process::Command;

use crate::error::GitError;
use crate::gix_repo::GixRepo;

pub fn read_config(repo: &GixRepo, key: &str) -> Result<Option<String>, GitError> {
    let snapshot = repo.repo.config_snapshot();
    Ok(snapshot.string(key).map(|v| v.to_string()))
}

pub fn write_config(repo: &GixRepo, key: &str, value: &str) -> Result<(), GitError> {
    let dir = repo
        .workdir
        .as_deref()
        .unwrap_or_else(|| repo.repo.git_dir());
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .arg("config")
        .arg(key)
        .arg(value)
        .output()?;
    if !output.status.success() {
        return Err(GitError::BackendError {
            message: format!(
                "git config {key} {value} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(())
}
