//! Push operations via git CLI fallback.
//!
//! Push is the one operation kept as a CLI subprocess because gix
//! does not yet provide a high-level push API.

use std::path::Path;
use std::process::Command;

use crate::error::GitError;
use crate::gix_repo::GixRepo;

pub fn push_branch(
    repo: &GixRepo,
    remote: &str,
    local_ref: &str,
    remote_ref: &str,
    force: bool,
) -> Result<(), GitError> {
    let dir = git_dir(repo)?;
    let refspec = format!("{local_ref}:{remote_ref}");
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(dir).arg("push");
    if force {
        cmd.arg("--force");
    }
    cmd.arg(remote).arg(&refspec);

    let output = cmd.output()?;
    if !output.status.success() {
        return Err(GitError::PushFailed {
            remote: remote.to_owned(),
            message: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(())
}

fn git_dir(repo: &GixRepo) -> Result<&Path, GitError> {
    repo.workdir.as_deref().ok_or_else(|| GitError::BackendError {
        message: "push requires a repository with a working directory".to_owned(),
    })
}
