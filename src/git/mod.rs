pub mod repository;

pub use repository::{CommitInfo, GitRepository, Identity};

use crate::errors::{PqError, Result};
use std::path::Path;

/// Find the root of the Git repository
pub fn find_repository_root(start_path: &Path) -> Result<std::path::PathBuf> {
    let repo = git2::Repository::discover(start_path).map_err(PqError::Git)?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| PqError::config("Repository has no working directory (bare repo?)"))?;

    Ok(workdir.to_path_buf())
}
