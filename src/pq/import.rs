//! Build a patch-queue branch from a quilt series
//!
//! The series is applied on top of the current branch tip. When a patch does
//! not apply, the next older first-parent commit is tried as baseline, up to
//! `tries` baselines in total.

use crate::config::Settings;
use crate::errors::{PqError, Result};
use crate::git::{GitRepository, Identity};
use crate::metadata::PackageMetadata;
use crate::pq::naming::BranchPattern;
use crate::pq::series::{Patch, PatchSeries};
use crate::pq::staging::StagedSeries;
use crate::pq::translate::patch_to_commit;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Options for [`import_quilt_patches`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Number of baselines to try
    pub tries: usize,
    /// Replace an existing patch-queue branch, even when standing on it
    pub force: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { tries: 1, force: false }
    }
}

impl ImportOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tries: settings.import.tries.max(1),
            force: settings.import.force,
        }
    }
}

/// Progress of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    BranchResolved,
    /// Trying a baseline; counts down from `tries` to 1
    Attempting(usize),
    Applied,
    Failed(usize),
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportState::Idle => write!(f, "idle"),
            ImportState::BranchResolved => write!(f, "branch resolved"),
            ImportState::Attempting(k) => write!(f, "attempting ({} left)", k),
            ImportState::Applied => write!(f, "applied"),
            ImportState::Failed(k) => write!(f, "failed ({} left)", k.saturating_sub(1)),
        }
    }
}

/// Result of a successful import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub base_branch: String,
    pub pq_branch: String,
    /// Commit the series was applied on
    pub baseline: String,
    pub applied: usize,
    /// Baselines tried, the successful one included
    pub tried: usize,
}

/// Series as declared by the package metadata, with headers read from the
/// patch files
pub fn load_series(metadata: &dyn PackageMetadata) -> Result<PatchSeries> {
    let patch_dir = metadata.patch_dir();
    let mut series = PatchSeries::new();

    for entry in metadata.load_series()? {
        let path = patch_dir.join(&entry.filename);
        let topic = std::path::Path::new(&entry.filename)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|t| !t.is_empty());
        let patch = Patch::from_file(&path)
            .map_err(|e| match e {
                PqError::Io(io) => PqError::config(format!(
                    "Patch '{}' listed in {} can't be read: {}",
                    entry.filename,
                    metadata.series_file().display(),
                    io
                )),
                other => other,
            })?
            .with_strip(entry.strip)
            .with_topic(topic);
        series.append(patch)?;
    }

    Ok(series)
}

struct Importer<'a> {
    repo: &'a GitRepository,
    state: ImportState,
}

impl<'a> Importer<'a> {
    fn transition(&mut self, next: ImportState) {
        debug!("Import: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Create `pq_branch` at `baseline` and apply the whole series on it
    fn attempt(
        &self,
        baseline: &str,
        pq_branch: &str,
        series: &PatchSeries,
        fallback: Option<&Identity>,
    ) -> Result<usize> {
        self.repo.create_branch(pq_branch, baseline)?;
        self.repo.checkout_branch(pq_branch)?;

        for patch in series {
            debug!("Applying {}", patch.display_name());
            patch_to_commit(self.repo, pq_branch, patch, fallback)?;
        }
        Ok(series.len())
    }

    /// Throw away a failed attempt and go back to `base_branch`
    fn abandon(&self, base_branch: &str, pq_branch: &str) -> Result<()> {
        if self.repo.get_current_branch().ok().as_deref() == Some(pq_branch) {
            self.repo.reset_hard(pq_branch)?;
            self.repo.checkout_branch(base_branch)?;
        }
        if self.repo.branch_exists(pq_branch) {
            self.repo.delete_branch(pq_branch)?;
        }
        Ok(())
    }
}

/// Import the series declared by `metadata` into the patch-queue branch of
/// the current branch.
///
/// On success the repository is left on the new patch-queue branch. On
/// failure it is back on the branch the import started from (its base when
/// forced from a patch-queue branch) and no patch-queue branch is left.
pub fn import_quilt_patches(
    repo: &GitRepository,
    pattern: &BranchPattern,
    metadata: &dyn PackageMetadata,
    opts: &ImportOptions,
    fallback: Option<&Identity>,
) -> Result<ImportReport> {
    let mut importer = Importer {
        repo,
        state: ImportState::Idle,
    };

    let current = repo.get_current_branch()?;
    let base_branch = if pattern.is_patch_queue(&current) {
        if !opts.force {
            return Err(PqError::AlreadyOnQueue(current));
        }
        let base = pattern.patch_queue_base(&current).ok_or_else(|| {
            PqError::branch(format!("Couldn't determine the base branch of '{}'", current))
        })?;
        info!("Switching to '{}'", base);
        repo.checkout_branch(&base)?;
        base
    } else {
        current
    };

    let pq_branch = pattern.patch_queue_name(&base_branch).ok_or_else(|| {
        PqError::branch(format!("'{}' is itself a patch-queue branch", base_branch))
    })?;
    importer.transition(ImportState::BranchResolved);

    if repo.branch_exists(&pq_branch) {
        if !opts.force {
            return Err(PqError::QueueExists(pq_branch));
        }
        info!("Removing existing patch-queue branch '{}'", pq_branch);
        repo.delete_branch(&pq_branch)?;
    }

    let series = load_series(metadata)?;
    let staged = if opts.tries > 1 {
        Some(StagedSeries::stage(&series, &metadata.patch_dir())?)
    } else {
        None
    };
    let series = staged.as_ref().map_or(&series, |s| s.series());

    let candidates = repo.get_commits(None, &base_branch, true, Some(opts.tries.max(1)))?;
    debug!("{} candidate baseline(s) for '{}'", candidates.len(), base_branch);

    for (idx, baseline) in candidates.iter().enumerate() {
        let remaining = opts.tries.max(1) - idx;
        importer.transition(ImportState::Attempting(remaining));
        info!("Trying to apply patches at '{}'", baseline);

        match importer.attempt(baseline, &pq_branch, series, fallback) {
            Ok(applied) => {
                importer.transition(ImportState::Applied);
                info!(
                    "Patches listed in '{}' imported on '{}'",
                    metadata.series_file().display(),
                    pq_branch
                );
                return Ok(ImportReport {
                    base_branch,
                    pq_branch,
                    baseline: baseline.clone(),
                    applied,
                    tried: idx + 1,
                });
            }
            Err(e) if e.is_recoverable_apply_failure() => {
                error!("Failed to apply patches at '{}': {}", baseline, e);
                importer.transition(ImportState::Failed(remaining));
                importer.abandon(&base_branch, &pq_branch)?;
            }
            Err(e) => {
                error!("Import at '{}' failed: {}", baseline, e);
                if let Err(cleanup) = importer.abandon(&base_branch, &pq_branch) {
                    warn!("Couldn't restore '{}': {}", base_branch, cleanup);
                }
                importer.transition(ImportState::Idle);
                return Err(e);
            }
        }
    }

    importer.transition(ImportState::Idle);
    Err(PqError::NoApplicableBaseline {
        tried: candidates.len(),
    })
}
