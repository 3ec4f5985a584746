//! Patch-queue engine
//!
//! Keeps a quilt patch series and a patch-queue branch in sync. Callers pick
//! an [`Action`] and hand it to [`dispatch`] together with a [`QueueContext`].

pub mod export;
pub mod import;
pub mod lifecycle;
pub mod naming;
pub mod series;
pub mod staging;
pub mod trailers;
pub mod translate;

pub use export::{export_patches, ExportOptions, ExportReport};
pub use import::{import_quilt_patches, ImportOptions, ImportReport, ImportState};
pub use naming::BranchPattern;
pub use series::{compare_series, Patch, PatchSeries, SeriesDiff};

use crate::errors::{Result, EXIT_NOTHING_TO_DO, EXIT_OK};
use crate::git::{GitRepository, Identity};
use crate::metadata::PackageMetadata;
use std::path::PathBuf;

/// Everything an action runs against
pub struct QueueContext<'a> {
    pub repo: &'a GitRepository,
    pub pattern: BranchPattern,
    pub metadata: &'a mut dyn PackageMetadata,
    /// Author for patches without one
    pub maintainer: Option<Identity>,
}

impl<'a> QueueContext<'a> {
    pub fn new(
        repo: &'a GitRepository,
        pattern: BranchPattern,
        metadata: &'a mut dyn PackageMetadata,
        maintainer: Option<Identity>,
    ) -> Self {
        Self {
            repo,
            pattern,
            metadata,
            maintainer,
        }
    }
}

/// Operations on the patch queue
#[derive(Debug, Clone)]
pub enum Action {
    Export(ExportOptions),
    Import(ImportOptions),
    Rebase,
    Drop,
    Switch,
    Apply { patch: PathBuf, topic: Option<String> },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Export(_) => "export",
            Action::Import(_) => "import",
            Action::Rebase => "rebase",
            Action::Drop => "drop",
            Action::Switch => "switch",
            Action::Apply { .. } => "apply",
        }
    }
}

/// Result of a dispatched action
#[derive(Debug, Clone)]
pub enum Outcome {
    Exported(ExportReport),
    Imported(ImportReport),
    Rebased { pq_branch: String, base_branch: String },
    Dropped { pq_branch: String },
    Switched { branch: String },
    Applied { pq_branch: String, commit: String },
    /// The action had nothing to work on
    NothingToDo(String),
}

impl Outcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::NothingToDo(_) => EXIT_NOTHING_TO_DO,
            Outcome::Exported(report) if report.is_empty() => EXIT_NOTHING_TO_DO,
            _ => EXIT_OK,
        }
    }
}

/// Run `action` on the current branch
pub fn dispatch(ctx: &mut QueueContext<'_>, action: Action) -> Result<Outcome> {
    let repo = ctx.repo;
    let current = repo.get_current_branch()?;
    tracing::debug!("Running '{}' on '{}'", action.name(), current);

    match action {
        Action::Export(opts) => {
            let report = export_patches(repo, &ctx.pattern, &mut *ctx.metadata, &opts)?;
            Ok(Outcome::Exported(report))
        }
        Action::Import(opts) => {
            let report = import_quilt_patches(
                repo,
                &ctx.pattern,
                &*ctx.metadata,
                &opts,
                ctx.maintainer.as_ref(),
            )?;
            Ok(Outcome::Imported(report))
        }
        Action::Rebase => {
            let base_branch = lifecycle::rebase_pq(repo, &ctx.pattern, &current)?;
            Ok(Outcome::Rebased {
                pq_branch: repo.get_current_branch()?,
                base_branch,
            })
        }
        Action::Drop => {
            let pq_branch = ctx.pattern.patch_queue_name(&current).unwrap_or_default();
            if lifecycle::drop_pq(repo, &ctx.pattern, &current)? {
                Ok(Outcome::Dropped { pq_branch })
            } else {
                Ok(Outcome::NothingToDo(format!(
                    "No patch queue branch '{}' found",
                    pq_branch
                )))
            }
        }
        Action::Switch => {
            let branch = lifecycle::switch_pq(repo, &ctx.pattern, &current)?;
            Ok(Outcome::Switched { branch })
        }
        Action::Apply { patch, topic } => {
            let patch = Patch::from_file(patch)?;
            let commit = lifecycle::apply_single(
                repo,
                &ctx.pattern,
                &current,
                &patch,
                topic,
                ctx.maintainer.as_ref(),
            )?;
            Ok(Outcome::Applied {
                pq_branch: repo.get_current_branch()?,
                commit,
            })
        }
    }
}
