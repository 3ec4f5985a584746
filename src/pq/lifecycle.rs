//! Operations on the patch-queue branch itself

use crate::errors::{PqError, Result};
use crate::git::{GitRepository, Identity};
use crate::pq::naming::BranchPattern;
use crate::pq::series::Patch;
use crate::pq::translate::patch_to_commit;
use tracing::{info, warn};

fn base_of(pattern: &BranchPattern, pq_branch: &str) -> Result<String> {
    pattern.patch_queue_base(pq_branch).ok_or_else(|| {
        PqError::branch(format!("Couldn't determine the base branch of '{}'", pq_branch))
    })
}

fn queue_of(pattern: &BranchPattern, branch: &str) -> Result<String> {
    pattern
        .patch_queue_name(branch)
        .ok_or_else(|| PqError::branch(format!("'{}' is itself a patch-queue branch", branch)))
}

/// Check out `branch` again after a failed operation, if it still exists.
/// Failures are only logged so the original error reaches the caller.
pub(crate) fn restore_branch(repo: &GitRepository, branch: &str) {
    if repo.get_current_branch().ok().as_deref() == Some(branch) || !repo.branch_exists(branch)
    {
        return;
    }
    match repo.checkout_branch(branch) {
        Ok(()) => info!("Switched back to '{}'", branch),
        Err(e) => warn!("Couldn't switch back to '{}': {}", branch, e),
    }
}

/// Delete the patch-queue branch of `branch`. Returns whether there was one.
pub fn drop_pq(repo: &GitRepository, pattern: &BranchPattern, branch: &str) -> Result<bool> {
    if pattern.is_patch_queue(branch) {
        return Err(PqError::branch(format!(
            "On a patch-queue branch '{}', can't drop it",
            branch
        )));
    }

    let pq_branch = queue_of(pattern, branch)?;
    if repo.branch_exists(&pq_branch) {
        repo.delete_branch(&pq_branch)?;
        info!("Dropped branch '{}'", pq_branch);
        Ok(true)
    } else {
        info!("No patch queue branch found - doing nothing");
        Ok(false)
    }
}

/// Check out the patch-queue branch of `branch`, creating it at `branch`
/// when missing. Returns the patch-queue branch name.
pub fn switch_to_pq_branch(
    repo: &GitRepository,
    pattern: &BranchPattern,
    branch: &str,
) -> Result<String> {
    if pattern.is_patch_queue(branch) {
        return Ok(branch.to_string());
    }

    let pq_branch = queue_of(pattern, branch)?;
    if !repo.branch_exists(&pq_branch) {
        repo.create_branch(&pq_branch, branch).map_err(|e| {
            PqError::branch(format!(
                "Cannot create patch-queue branch '{}'. Try 'rebase' instead: {}",
                pq_branch, e
            ))
        })?;
    }

    info!("Switching to '{}'", pq_branch);
    repo.checkout_branch(&pq_branch)?;
    Ok(pq_branch)
}

/// Rebase the patch-queue branch of `branch` onto its base
pub fn rebase_pq(repo: &GitRepository, pattern: &BranchPattern, branch: &str) -> Result<String> {
    let base = if pattern.is_patch_queue(branch) {
        base_of(pattern, branch)?
    } else {
        switch_to_pq_branch(repo, pattern, branch)?;
        branch.to_string()
    };

    repo.rebase_onto(&base)?;
    Ok(base)
}

/// Toggle between a base branch and its patch-queue branch. Returns the
/// branch now checked out.
pub fn switch_pq(repo: &GitRepository, pattern: &BranchPattern, current: &str) -> Result<String> {
    if pattern.is_patch_queue(current) {
        let base = base_of(pattern, current)?;
        info!("Switching to '{}'", base);
        repo.checkout_branch(&base)?;
        Ok(base)
    } else {
        switch_to_pq_branch(repo, pattern, current)
    }
}

/// Apply one patch on top of the patch-queue branch without touching the
/// series. Returns the new commit. When the patch doesn't apply, `branch`
/// is checked out again.
pub fn apply_single(
    repo: &GitRepository,
    pattern: &BranchPattern,
    branch: &str,
    patch: &Patch,
    topic: Option<String>,
    fallback: Option<&Identity>,
) -> Result<String> {
    let pq_branch = switch_to_pq_branch(repo, pattern, branch)?;
    let patch = match topic {
        Some(topic) => patch.clone().with_topic(Some(topic)),
        None => patch.clone(),
    };

    let commit = patch_to_commit(repo, &pq_branch, &patch, fallback).inspect_err(|_| {
        restore_branch(repo, branch);
    })?;
    info!("Applied '{}' to '{}'", patch.display_name(), pq_branch);
    Ok(commit)
}
