use crate::cli::output::Output;
use crate::cli::{Commands, GlobalArgs};
use crate::config::Settings;
use crate::errors::{PqError, Result};
use crate::git::{GitRepository, Identity};
use crate::metadata::{PackageMetadata, QuiltMetadata};
use crate::pq::{dispatch, Action, BranchPattern, ExportOptions, ImportOptions, Outcome, QueueContext};
use std::env;
use std::path::PathBuf;

impl GlobalArgs {
    /// Repository path given on the command line, else the current directory
    pub fn repo_path(&self) -> Result<PathBuf> {
        match &self.repo {
            Some(path) => Ok(path.clone()),
            None => env::current_dir()
                .map_err(|e| PqError::config(format!("Could not get current directory: {e}"))),
        }
    }

    /// Apply the global overrides to loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(pattern) = &self.pq_branch {
            settings.branches.pq_branch = pattern.clone();
        }
        if let Some(dir) = &self.packaging_dir {
            settings.packaging.packaging_dir = dir.clone();
        }
    }
}

/// Translate a queue command into an action, folding its flags into `settings`
pub fn to_action(command: Commands, settings: &mut Settings) -> Result<Action> {
    match command {
        Commands::Export {
            commit,
            drop,
            no_patch_numbers,
            squash_until,
            export_rev,
            ignore_regex,
            compress,
            upstream_tag,
        } => {
            let export = &mut settings.export;
            export.commit |= commit;
            export.drop |= drop;
            if no_patch_numbers {
                export.patch_numbers = false;
            }
            if squash_until.is_some() {
                export.squash_until = squash_until;
            }
            if export_rev.is_some() {
                export.export_rev = export_rev;
            }
            if ignore_regex.is_some() {
                export.ignore_regex = ignore_regex;
            }
            if let Some(threshold) = compress {
                export.compress_threshold = threshold;
            }
            if upstream_tag.is_some() {
                settings.branches.upstream_tag = upstream_tag;
            }
            settings.validate()?;
            Ok(Action::Export(ExportOptions::from_settings(settings)?))
        }
        Commands::Import { force, tries } => {
            settings.import.force |= force;
            if let Some(tries) = tries {
                settings.import.tries = tries;
            }
            settings.validate()?;
            Ok(Action::Import(ImportOptions::from_settings(settings)))
        }
        Commands::Rebase => Ok(Action::Rebase),
        Commands::Drop => Ok(Action::Drop),
        Commands::Switch => Ok(Action::Switch),
        Commands::Apply { patch, topic } => {
            let patch = patch.ok_or_else(|| PqError::usage("No patch name given"))?;
            Ok(Action::Apply { patch, topic })
        }
        Commands::Config { .. } | Commands::Completions { .. } => {
            Err(PqError::usage("Not a patch-queue action"))
        }
    }
}

/// Run a patch-queue command and return the exit status
pub fn run(global: &GlobalArgs, command: Commands) -> Result<u8> {
    let repo = GitRepository::open(&global.repo_path()?)?;

    let mut settings = Settings::load_for_repo(repo.path())?;
    global.apply(&mut settings);
    let action = to_action(command, &mut settings)?;

    let pattern = BranchPattern::new(
        settings.branches.pq_branch.as_str(),
        settings.branches.packaging_branch.as_str(),
    );
    let mut metadata = QuiltMetadata::new(repo.path().join(&settings.packaging.packaging_dir));
    let maintainer = settings
        .identity
        .maintainer
        .as_deref()
        .and_then(Identity::parse)
        .or_else(|| metadata.maintainer());

    let mut ctx = QueueContext::new(&repo, pattern, &mut metadata, maintainer);
    let outcome = dispatch(&mut ctx, action)?;
    report(&outcome);
    Ok(outcome.exit_code())
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Exported(report) => {
            if report.is_empty() {
                Output::info(format!("No patches on '{}' - nothing to do", report.pq_branch));
                return;
            }
            Output::success(format!(
                "Exported {} patch(es) from '{}'",
                report.patches.len(),
                report.pq_branch
            ));
            if report.diff.is_empty() {
                Output::sub_item("No changes to the series");
            }
            for name in &report.diff.added {
                Output::bullet(format!("added {}", name));
            }
            for name in &report.diff.removed {
                Output::bullet(format!("dropped {}", name));
            }
            if let Some(commit) = &report.commit {
                Output::sub_item(format!("Committed as {}", &commit[..7.min(commit.len())]));
            } else if !report.diff.is_empty() {
                Output::section("Suggested commit message");
                println!("{}", report.message);
            }
            if report.dropped {
                Output::sub_item(format!("Dropped '{}'", report.pq_branch));
            }
        }
        Outcome::Imported(report) => {
            Output::success(format!(
                "Imported {} patch(es) into '{}'",
                report.applied, report.pq_branch
            ));
            Output::sub_item(format!(
                "Baseline {} ({} tried)",
                &report.baseline[..7.min(report.baseline.len())],
                report.tried
            ));
        }
        Outcome::Rebased {
            pq_branch,
            base_branch,
        } => Output::success(format!("Rebased '{}' onto '{}'", pq_branch, base_branch)),
        Outcome::Dropped { pq_branch } => Output::success(format!("Dropped '{}'", pq_branch)),
        Outcome::Switched { branch } => Output::success(format!("Switched to '{}'", branch)),
        Outcome::Applied { pq_branch, commit } => Output::success(format!(
            "Applied patch to '{}' as {}",
            pq_branch,
            &commit[..7.min(commit.len())]
        )),
        Outcome::NothingToDo(reason) => Output::warning(reason),
    }
}
